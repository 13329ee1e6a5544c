pub mod assessment;
pub mod config;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use crate::assessment::TimerDriver;
use crate::config::Config;
use crate::services::{
    attempt_service::AttemptService, audit_service::AuditService, auth_service::AuthService,
    invitation_service::InvitationService, mail_service::InvitationMailer,
    notification_service::NotificationService, result_service::ResultService,
    test_service::TestService,
};
use reqwest::Client;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub test_service: TestService,
    pub invitation_service: InvitationService,
    pub attempt_service: AttemptService,
    pub result_service: ResultService,
    pub notification_service: NotificationService,
    pub audit_service: AuditService,
    pub auth_service: AuthService,
}

impl AppState {
    pub fn new(config: Config, mailer: Arc<dyn InvitationMailer>) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        let test_service = TestService::new();
        let invitation_service = InvitationService::new(
            mailer,
            config.webapp_url.clone(),
            config.invitation_ttl_hours,
        );
        let result_service = ResultService::new();
        let notification_service = NotificationService::new(
            http_client,
            config.webhook_url.clone(),
            config.webhook_secret.clone(),
        );
        let audit_service = AuditService::new();
        let attempt_service = AttemptService::new(
            test_service.clone(),
            invitation_service.clone(),
            result_service.clone(),
            notification_service.clone(),
            audit_service.clone(),
            config.scoring,
            TimerDriver::new(Duration::from_millis(config.tick_interval_ms)),
        );
        let auth_service = AuthService::new(&config, invitation_service.clone());

        Self {
            config: Arc::new(config),
            test_service,
            invitation_service,
            attempt_service,
            result_service,
            notification_service,
            audit_service,
            auth_service,
        }
    }
}

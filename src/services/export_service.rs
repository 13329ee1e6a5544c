use crate::assessment::SubmissionTrigger;
use crate::error::Result;
use crate::models::result_record::ResultRecord;
use crate::utils::time::format_countdown;
use rust_xlsxwriter::*;

pub struct ExportService;

impl ExportService {
    /// Builds a styled results workbook: title, column headers, one row per
    /// result and a summary row.
    pub fn generate_results_xlsx(results: &[ResultRecord]) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Results")?;

        let primary_color = Color::RGB(0x1E293B);
        let header_bg = Color::RGB(0x0F172A);
        let border_color = Color::RGB(0xE2E8F0);
        let alt_row = Color::RGB(0xF8FAFC);
        let passed_color = Color::RGB(0x10B981);
        let failed_color = Color::RGB(0xEF4444);

        let columns = [
            ("#", 6.0),
            ("Candidate", 28.0),
            ("E-mail", 30.0),
            ("Test", 30.0),
            ("Score", 10.0),
            ("Questions", 11.0),
            ("Percentage", 12.0),
            ("Outcome", 12.0),
            ("Submitted by", 14.0),
            ("Time spent", 12.0),
            ("Submitted at", 20.0),
        ];
        for (i, (_, width)) in columns.iter().enumerate() {
            worksheet.set_column_width(i as u16, *width)?;
        }
        let last_col = (columns.len() - 1) as u16;

        let title_format = Format::new()
            .set_font_size(16)
            .set_bold()
            .set_font_color(Color::White)
            .set_background_color(primary_color)
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter);
        worksheet.set_row_height(0, 36)?;
        worksheet.merge_range(0, 0, 0, last_col, "Test results", &title_format)?;

        let subtitle_format = Format::new()
            .set_font_size(10)
            .set_italic()
            .set_font_color(Color::RGB(0x94A3B8))
            .set_background_color(primary_color)
            .set_align(FormatAlign::Center);
        let exported_at = chrono::Utc::now().format("%d.%m.%Y %H:%M UTC");
        worksheet.merge_range(
            1,
            0,
            1,
            last_col,
            &format!("Exported {}  •  {} results", exported_at, results.len()),
            &subtitle_format,
        )?;

        let header_format = Format::new()
            .set_bold()
            .set_font_size(10)
            .set_font_color(Color::White)
            .set_background_color(header_bg)
            .set_align(FormatAlign::Center)
            .set_border(FormatBorder::Thin)
            .set_border_color(border_color);
        let header_row = 2;
        for (i, (name, _)) in columns.iter().enumerate() {
            worksheet.write_string_with_format(header_row, i as u16, *name, &header_format)?;
        }

        let data_start_row = 3;
        for (idx, result) in results.iter().enumerate() {
            let row = data_start_row + idx as u32;
            let bg = if idx % 2 == 0 { alt_row } else { Color::White };
            let base_fmt = Format::new()
                .set_font_size(10)
                .set_background_color(bg)
                .set_border(FormatBorder::Thin)
                .set_border_color(border_color);
            let center_fmt = base_fmt.clone().set_align(FormatAlign::Center);

            worksheet.write_number_with_format(row, 0, (idx + 1) as f64, &center_fmt)?;
            worksheet.write_string_with_format(
                row,
                1,
                result.candidate_name.as_deref().unwrap_or("-"),
                &base_fmt,
            )?;
            worksheet.write_string_with_format(row, 2, &result.candidate_email, &base_fmt)?;
            worksheet.write_string_with_format(row, 3, &result.test_title, &base_fmt)?;
            worksheet.write_number_with_format(row, 4, result.score as f64, &center_fmt)?;
            worksheet.write_number_with_format(row, 5, result.total_questions as f64, &center_fmt)?;
            worksheet.write_number_with_format(row, 6, result.percentage as f64, &center_fmt)?;

            let outcome_fmt = Format::new()
                .set_font_size(10)
                .set_bold()
                .set_font_color(Color::White)
                .set_background_color(if result.passed { passed_color } else { failed_color })
                .set_align(FormatAlign::Center)
                .set_border(FormatBorder::Thin)
                .set_border_color(border_color);
            worksheet.write_string_with_format(
                row,
                7,
                if result.passed { "Passed" } else { "Failed" },
                &outcome_fmt,
            )?;

            let trigger = match result.trigger {
                SubmissionTrigger::Manual => "Candidate",
                SubmissionTrigger::TimeExpired => "Timer",
            };
            worksheet.write_string_with_format(row, 8, trigger, &center_fmt)?;
            worksheet.write_string_with_format(
                row,
                9,
                &format_countdown(result.time_spent_seconds),
                &center_fmt,
            )?;
            worksheet.write_string_with_format(
                row,
                10,
                &result.submitted_at.format("%d.%m.%Y %H:%M").to_string(),
                &center_fmt,
            )?;
        }

        let total_row = data_start_row + results.len() as u32 + 1;
        let summary_fmt = Format::new()
            .set_bold()
            .set_font_size(10)
            .set_font_color(primary_color)
            .set_background_color(Color::RGB(0xE0E7FF))
            .set_align(FormatAlign::Center)
            .set_border(FormatBorder::Thin)
            .set_border_color(border_color);
        let passed = results.iter().filter(|r| r.passed).count();
        let average = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|r| r.percentage as f64).sum::<f64>() / results.len() as f64
        };
        worksheet.merge_range(
            total_row,
            0,
            total_row,
            last_col,
            &format!(
                "Total: {}  |  Passed: {}  |  Failed: {}  |  Average: {:.0}%",
                results.len(),
                passed,
                results.len() - passed,
                average
            ),
            &summary_fmt,
        )?;

        worksheet.set_freeze_panes(3, 0)?;

        let buffer = workbook.save_to_buffer()?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::result_service::fixtures::record;
    use uuid::Uuid;

    #[test]
    fn workbook_is_a_zip_archive() {
        let test_id = Uuid::new_v4();
        let results = vec![
            record("ada@example.com", test_id, 2, 3, true),
            record("bob@example.com", test_id, 0, 3, false),
        ];
        let bytes = ExportService::generate_results_xlsx(&results).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn empty_export_still_renders() {
        let bytes = ExportService::generate_results_xlsx(&[]).unwrap();
        assert!(!bytes.is_empty());
    }
}

use crate::domain::model::{AcademicDocument, Outline, SourceSummary};
use crate::utils::error::{Result, ScholarError};
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

pub const MARKDOWN_FILE: &str = "document.md";
pub const REFERENCES_FILE: &str = "references.csv";
pub const OUTLINE_FILE: &str = "outline.json";
pub const SUMMARIES_FILE: &str = "summaries.json";

/// 參考文獻轉為 CSV：number,title,url,site,accessed_on
pub fn references_csv(document: &AcademicDocument) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["number", "title", "url", "site", "accessed_on"])?;
    for reference in &document.references {
        writer.write_record([
            reference.number.to_string(),
            reference.title.clone(),
            reference.url.clone(),
            reference.site_name.clone().unwrap_or_default(),
            reference.accessed_on.format("%Y-%m-%d").to_string(),
        ])?;
    }

    let bytes = writer.into_inner().map_err(|e| ScholarError::ProcessingError {
        message: format!("failed to flush CSV writer: {}", e),
    })?;
    String::from_utf8(bytes).map_err(|e| ScholarError::ProcessingError {
        message: format!("CSV output is not UTF-8: {}", e),
    })
}

/// 打包文件、參考文獻、索引與摘要筆記為 ZIP
pub fn export_bundle(
    document: &AcademicDocument,
    outline: Option<&Outline>,
    summaries: &[SourceSummary],
) -> Result<Vec<u8>> {
    let markdown = document.to_markdown();
    let references = references_csv(document)?;

    tracing::debug!(
        "📦 Creating ZIP bundle for \"{}\" ({} references)",
        document.title,
        document.references.len()
    );

    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

    zip.start_file::<_, ()>(MARKDOWN_FILE, FileOptions::default())?;
    zip.write_all(markdown.as_bytes())?;

    zip.start_file::<_, ()>(REFERENCES_FILE, FileOptions::default())?;
    zip.write_all(references.as_bytes())?;

    if let Some(outline) = outline {
        zip.start_file::<_, ()>(OUTLINE_FILE, FileOptions::default())?;
        zip.write_all(serde_json::to_string_pretty(outline)?.as_bytes())?;
    }

    if !summaries.is_empty() {
        zip.start_file::<_, ()>(SUMMARIES_FILE, FileOptions::default())?;
        zip.write_all(serde_json::to_string_pretty(summaries)?.as_bytes())?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{DraftedSection, OutlineSection, Reference};
    use chrono::{NaiveDate, Utc};
    use std::io::Read;

    fn document() -> AcademicDocument {
        AcademicDocument {
            title: "Heat".to_string(),
            topic: "Urban heat".to_string(),
            language: "English".to_string(),
            introduction: "Intro".to_string(),
            sections: vec![DraftedSection {
                index: 1,
                title: "Causes".to_string(),
                body: "Body".to_string(),
            }],
            conclusion: "End".to_string(),
            references: vec![Reference {
                number: 1,
                title: "Cities, heat and \"albedo\"".to_string(),
                url: "https://example.org/1".to_string(),
                site_name: Some("Example".to_string()),
                accessed_on: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
            }],
            warnings: vec![],
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_references_csv_quotes_fields() {
        let csv = references_csv(&document()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("number,title,url,site,accessed_on"));
        assert_eq!(
            lines.next(),
            Some("1,\"Cities, heat and \"\"albedo\"\"\",https://example.org/1,Example,2026-10-18")
        );
    }

    #[test]
    fn test_export_bundle_contents() {
        let outline = Outline {
            title: "Heat".to_string(),
            sections: vec![OutlineSection {
                title: "Causes".to_string(),
                description: String::new(),
            }],
        };
        let data = export_bundle(&document(), Some(&outline), &[]).unwrap();

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(data)).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec![MARKDOWN_FILE, REFERENCES_FILE, OUTLINE_FILE]);

        let mut markdown = String::new();
        archive
            .by_name(MARKDOWN_FILE)
            .unwrap()
            .read_to_string(&mut markdown)
            .unwrap();
        assert!(markdown.starts_with("# Heat"));
    }
}

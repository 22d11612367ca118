use crate::core::pipeline_sequence::DocumentContext;
use crate::domain::model::{AcademicDocument, Reference};
use crate::utils::error::{Result, ScholarError};
use chrono::{Datelike, NaiveDate, Utc};

/// 依文件語言選用的固定標題與參考文獻用語
struct Labels {
    introduction: &'static str,
    conclusion: &'static str,
    references: &'static str,
    available_at: &'static str,
    accessed_on: &'static str,
    months: [&'static str; 12],
}

const PORTUGUESE: Labels = Labels {
    introduction: "Introdução",
    conclusion: "Conclusão",
    references: "Referências",
    available_at: "Disponível em",
    accessed_on: "Acesso em",
    months: [
        "jan.", "fev.", "mar.", "abr.", "maio", "jun.", "jul.", "ago.", "set.", "out.", "nov.",
        "dez.",
    ],
};

const SPANISH: Labels = Labels {
    introduction: "Introducción",
    conclusion: "Conclusión",
    references: "Referencias",
    available_at: "Disponible en",
    accessed_on: "Consultado el",
    months: [
        "ene.", "feb.", "mar.", "abr.", "may.", "jun.", "jul.", "ago.", "sept.", "oct.", "nov.",
        "dic.",
    ],
};

const ENGLISH: Labels = Labels {
    introduction: "Introduction",
    conclusion: "Conclusion",
    references: "References",
    available_at: "Available at",
    accessed_on: "Accessed",
    months: [
        "Jan.", "Feb.", "Mar.", "Apr.", "May", "June", "July", "Aug.", "Sept.", "Oct.", "Nov.",
        "Dec.",
    ],
};

fn labels_for(language: &str) -> &'static Labels {
    let lower = language.to_lowercase();
    if lower.starts_with("portugu") || lower.starts_with("pt") {
        &PORTUGUESE
    } else if lower.starts_with("espa") || lower.starts_with("spanish") || lower.starts_with("es") {
        &SPANISH
    } else {
        &ENGLISH
    }
}

fn format_date(date: NaiveDate, labels: &Labels) -> String {
    format!(
        "{} {} {}",
        date.day(),
        labels.months[date.month0() as usize],
        date.year()
    )
}

/// 參考文獻條目，格式參照 ABNT 的線上文件寫法：
/// `[n] SITE. **Title**. Disponível em: <url>. Acesso em: 18 out. 2026.`
pub fn format_reference(reference: &Reference, language: &str) -> String {
    let labels = labels_for(language);
    let mut entry = format!("[{}] ", reference.number);
    if let Some(site) = &reference.site_name {
        entry.push_str(&site.to_uppercase());
        entry.push_str(". ");
    }
    entry.push_str(&format!(
        "**{}**. {}: <{}>. {}: {}.",
        reference.title.trim_end_matches('.'),
        labels.available_at,
        reference.url,
        labels.accessed_on,
        format_date(reference.accessed_on, labels)
    ));
    entry
}

/// 由上下文組裝最終文件；參考文獻只收錄有摘要的來源，編號沿用引用編號
pub fn assemble_document(context: &DocumentContext) -> Result<AcademicDocument> {
    let topic = context.require_topic()?;
    let outline = context.require_outline()?;
    let missing = |part: &str| ScholarError::ProcessingError {
        message: format!("cannot assemble document without {}", part),
    };

    let introduction = context.introduction.clone().ok_or_else(|| missing("an introduction"))?;
    let conclusion = context.conclusion.clone().ok_or_else(|| missing("a conclusion"))?;
    if context.sections.is_empty() {
        return Err(missing("developed sections"));
    }

    let mut references: Vec<Reference> = context
        .summaries
        .iter()
        .filter_map(|summary| context.sources.iter().find(|s| s.id == summary.source_id))
        .map(|source| Reference {
            number: source.id,
            title: source.title.clone(),
            url: source.url.clone(),
            site_name: source.site_name.clone(),
            accessed_on: source.fetched_at.date_naive(),
        })
        .collect();
    references.sort_by_key(|r| r.number);
    references.dedup_by_key(|r| r.number);

    Ok(AcademicDocument {
        title: outline.title.clone(),
        topic: topic.topic.clone(),
        language: context.language.clone(),
        introduction,
        sections: context.sections.clone(),
        conclusion,
        references,
        warnings: context.warnings.clone(),
        generated_at: Utc::now(),
    })
}

impl AcademicDocument {
    /// 以 Markdown 輸出：引言、各節、結論編號連續，最後是參考文獻
    pub fn to_markdown(&self) -> String {
        let labels = labels_for(&self.language);
        let mut out = format!("# {}\n\n", self.title);

        out.push_str(&format!("## 1 {}\n\n{}\n\n", labels.introduction, self.introduction.trim()));
        for (offset, section) in self.sections.iter().enumerate() {
            out.push_str(&format!(
                "## {} {}\n\n{}\n\n",
                offset + 2,
                section.title,
                section.body.trim()
            ));
        }
        out.push_str(&format!(
            "## {} {}\n\n{}\n\n",
            self.sections.len() + 2,
            labels.conclusion,
            self.conclusion.trim()
        ));

        out.push_str(&format!("## {}\n\n", labels.references));
        for reference in &self.references {
            out.push_str(&format_reference(reference, &self.language));
            out.push_str("\n\n");
        }

        out.trim_end().to_string() + "\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stages::topic_from_text;
    use crate::domain::model::{
        DocumentRequest, DraftedSection, Outline, OutlineSection, ScrapedSource, SourceSummary,
    };
    use chrono::TimeZone;

    fn source(id: usize) -> ScrapedSource {
        ScrapedSource {
            id,
            title: format!("Source {}", id),
            url: format!("https://example.org/{}", id),
            site_name: Some("example.org".to_string()),
            content: "text".to_string(),
            fetched_at: Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap(),
        }
    }

    fn summary(id: usize) -> SourceSummary {
        SourceSummary {
            source_id: id,
            title: format!("Source {}", id),
            url: format!("https://example.org/{}", id),
            summary: "s".to_string(),
            key_points: vec![],
        }
    }

    fn ready_context(language: &str) -> DocumentContext {
        let mut ctx = DocumentContext::new(
            "t".to_string(),
            DocumentRequest::default(),
            language.to_string(),
            3,
        );
        ctx.topic = Some(topic_from_text("Urban heat"));
        ctx.outline = Some(Outline {
            title: "Ilhas de calor".to_string(),
            sections: vec![OutlineSection {
                title: "Causas".to_string(),
                description: String::new(),
            }],
        });
        ctx.sources = vec![source(1), source(2), source(3)];
        // 來源 2 沒有摘要，不應出現在參考文獻
        ctx.summaries = vec![summary(3), summary(1)];
        ctx.introduction = Some("Intro [1].".to_string());
        ctx.sections = vec![DraftedSection {
            index: 1,
            title: "Causas".to_string(),
            body: "Body [3].".to_string(),
        }];
        ctx.conclusion = Some("Fim.".to_string());
        ctx
    }

    #[test]
    fn test_assemble_document_references() {
        let document = assemble_document(&ready_context("português do Brasil")).unwrap();

        let numbers: Vec<usize> = document.references.iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![1, 3]);
        assert_eq!(document.title, "Ilhas de calor");
    }

    #[test]
    fn test_assemble_requires_conclusion() {
        let mut ctx = ready_context("English");
        ctx.conclusion = None;
        assert!(assemble_document(&ctx).is_err());
    }

    #[test]
    fn test_markdown_layout_in_portuguese() {
        let markdown = assemble_document(&ready_context("português do Brasil"))
            .unwrap()
            .to_markdown();

        assert!(markdown.starts_with("# Ilhas de calor\n\n## 1 Introdução\n\nIntro [1]."));
        assert!(markdown.contains("## 2 Causas\n\nBody [3]."));
        assert!(markdown.contains("## 3 Conclusão\n\nFim."));
        assert!(markdown.contains(
            "[1] EXAMPLE.ORG. **Source 1**. Disponível em: <https://example.org/1>. Acesso em: 18 out. 2026."
        ));
    }

    #[test]
    fn test_reference_in_english() {
        let reference = Reference {
            number: 2,
            title: "Heat.".to_string(),
            url: "https://example.org".to_string(),
            site_name: None,
            accessed_on: NaiveDate::from_ymd_opt(2026, 5, 3).unwrap(),
        };
        assert_eq!(
            format_reference(&reference, "English"),
            "[2] **Heat**. Available at: <https://example.org>. Accessed: 3 May 2026."
        );
    }
}

use crate::domain::model::{
    ChatMessage, DraftedSection, Outline, OutlineSection, ScrapedSource, SourceSummary,
    TopicAnalysis,
};
use crate::utils::text::truncate_chars;

/// 各任務的 system 訊息，同時用來辨識是哪一種呼叫
pub const TOPIC_ROLE: &str = "You identify the research topic behind a writing request.";
pub const SUMMARY_ROLE: &str =
    "You write a fichamento (structured reading notes) of a single source for academic work.";
pub const OUTLINE_ROLE: &str = "You design the index (table of contents) of an academic text.";
pub const INTRODUCTION_ROLE: &str = "You write the opening introduction of an academic text.";
pub const SECTION_ROLE: &str = "You write one developed section of an academic text.";
pub const CONCLUSION_ROLE: &str = "You write the closing conclusion of an academic text.";

const CITATION_RULE: &str =
    "Cite sources only with their bracketed number, e.g. [1] or [2, 3]. Never invent sources.";

/// 結論提示中每節正文的截斷長度
const SECTION_DIGEST_CHARS: usize = 1_200;

pub fn topic_prompt(request: &str, language: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(TOPIC_ROLE),
        ChatMessage::user(format!(
            "Writing request:\n{request}\n\n\
             Answer only with a JSON object of the form \
             {{\"title\": \"...\", \"topic\": \"...\", \"search_query\": \"...\", \"keywords\": [\"...\"]}}.\n\
             `title` is a formal academic title and `topic` a one-sentence statement of the subject, both in {language}. \
             `search_query` is a short web search query (at most 8 words) likely to find reliable sources."
        )),
    ]
}

pub fn summary_prompt(topic: &str, source: &ScrapedSource, language: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SUMMARY_ROLE),
        ChatMessage::user(format!(
            "Research topic: {topic}\n\
             Source [{id}]: {title}\n\
             URL: {url}\n\n\
             Content:\n{content}\n\n\
             Write in {language}. Start with one paragraph summarizing what this source says about the topic. \
             Then list the key points, one per line, each line starting with \"- \". \
             Ignore navigation text, advertisements and anything unrelated to the topic.",
            id = source.id,
            title = source.title,
            url = source.url,
            content = source.content,
        )),
    ]
}

pub fn outline_prompt(
    topic: &TopicAnalysis,
    summaries: &[SourceSummary],
    min_sections: usize,
    max_sections: usize,
    language: &str,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(OUTLINE_ROLE),
        ChatMessage::user(format!(
            "Working title: {title}\nTopic: {topic}\n\nReading notes:\n{notes}\n\n\
             Propose between {min_sections} and {max_sections} developed sections, excluding the introduction \
             and the conclusion, which are written separately. Write titles and descriptions in {language}.\n\
             Answer only with a JSON object of the form \
             {{\"title\": \"...\", \"sections\": [{{\"title\": \"...\", \"description\": \"...\"}}]}}.",
            title = topic.title,
            topic = topic.topic,
            notes = format_notes(summaries),
        )),
    ]
}

pub fn introduction_prompt(
    topic: &TopicAnalysis,
    outline: &Outline,
    summaries: &[SourceSummary],
    language: &str,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(INTRODUCTION_ROLE),
        ChatMessage::user(format!(
            "Title: {title}\nTopic: {topic}\n\nIndex:\n{index}\n\nReading notes:\n{notes}\n\n\
             Write in {language} an introduction of three to five paragraphs that presents the subject, \
             its relevance and the structure of the text. {CITATION_RULE} \
             Do not include a heading.",
            title = outline.title,
            topic = topic.topic,
            index = format_index(&outline.sections),
            notes = format_notes(summaries),
        )),
    ]
}

pub fn section_prompt(
    topic: &TopicAnalysis,
    outline: &Outline,
    position: usize,
    written_titles: &[String],
    summaries: &[SourceSummary],
    language: &str,
) -> Vec<ChatMessage> {
    let section = &outline.sections[position];
    let already_written = if written_titles.is_empty() {
        "none".to_string()
    } else {
        written_titles.join("; ")
    };

    vec![
        ChatMessage::system(SECTION_ROLE),
        ChatMessage::user(format!(
            "Title: {title}\nTopic: {topic}\n\nIndex:\n{index}\n\n\
             Section to write now: {number}. {section_title}\nScope: {description}\n\
             Sections already written: {already_written}\n\n\
             Reading notes:\n{notes}\n\n\
             Write in {language} the body of this section in four to eight paragraphs, \
             developing the argument without repeating the other sections. {CITATION_RULE} \
             Do not include the section heading.",
            title = outline.title,
            topic = topic.topic,
            index = format_index(&outline.sections),
            number = position + 1,
            section_title = section.title,
            description = section.description,
            notes = format_notes(summaries),
        )),
    ]
}

pub fn conclusion_prompt(
    topic: &TopicAnalysis,
    outline: &Outline,
    sections: &[DraftedSection],
    language: &str,
) -> Vec<ChatMessage> {
    let digest = sections
        .iter()
        .map(|s| {
            format!(
                "{}. {}\n{}",
                s.index,
                s.title,
                truncate_chars(&s.body, SECTION_DIGEST_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    vec![
        ChatMessage::system(CONCLUSION_ROLE),
        ChatMessage::user(format!(
            "Title: {title}\nTopic: {topic}\n\nDeveloped sections:\n{digest}\n\n\
             Write in {language} a conclusion of two to four paragraphs that retakes the main findings \
             and points out limitations and further questions. Do not introduce new sources. \
             Do not include a heading.",
            title = outline.title,
            topic = topic.topic,
        )),
    ]
}

fn format_index(sections: &[OutlineSection]) -> String {
    sections
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s.title))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_notes(summaries: &[SourceSummary]) -> String {
    summaries
        .iter()
        .map(|s| {
            let mut note = format!("[{}] {} ({})\n{}", s.source_id, s.title, s.url, s.summary);
            for point in &s.key_points {
                note.push_str("\n- ");
                note.push_str(point);
            }
            note
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

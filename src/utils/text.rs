//! 文字處理工具：空白正規化、截斷、slug 與 LLM 回應中的 JSON 擷取

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").unwrap());
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:\d+[.)]|[-*•])\s+").unwrap());

pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// 依字元（非位元組）截斷，確保不切斷 UTF-8 字元
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in text.chars() {
        let c = fold_accent(c);
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "document".to_string()
    } else {
        truncate_chars(slug, 80).trim_end_matches('-').to_string()
    }
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'u',
        'ç' | 'Ç' => 'c',
        'ñ' | 'Ñ' => 'n',
        other => other,
    }
}

/// 從 LLM 回應中找出 JSON 片段：先找 ``` 區塊，再找第一個平衡的 {...} 或 [...]
pub fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(caps) = FENCED_BLOCK.captures(text) {
        if let Some(inner) = caps.get(1) {
            let inner = inner.as_str().trim();
            if inner.starts_with('{') || inner.starts_with('[') {
                return Some(inner);
            }
        }
    }

    let start = text.find(['{', '['])?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            match b {
                b'\\' if !escaped => escaped = true,
                b'"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 解析 "1. Título" / "- Título" 形式的清單行
pub fn parse_list_items(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| LIST_MARKER.is_match(line))
        .map(|line| LIST_MARKER.replace(line, "").trim().trim_matches('*').trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\t b  c "), "a b c");
    }

    #[test]
    fn test_truncate_chars_respects_utf8() {
        assert_eq!(truncate_chars("ação", 2), "aç");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Mudanças Climáticas no Brasil!"), "mudancas-climaticas-no-brasil");
        assert_eq!(slugify("???"), "document");
    }

    #[test]
    fn test_extract_json_block_from_fence() {
        let text = "Here you go:\n```json\n{\"topic\": \"x\"}\n```\nthanks";
        assert_eq!(extract_json_block(text), Some("{\"topic\": \"x\"}"));
    }

    #[test]
    fn test_extract_json_block_balanced() {
        let text = "Answer: {\"a\": {\"b\": \"}\"}} trailing";
        assert_eq!(extract_json_block(text), Some("{\"a\": {\"b\": \"}\"}}"));
        assert_eq!(extract_json_block("no json here"), None);
    }

    #[test]
    fn test_parse_list_items() {
        let text = "Index:\n1. Origins\n2) Current state\n- **Impacts**\nnot an item";
        assert_eq!(
            parse_list_items(text),
            vec!["Origins", "Current state", "Impacts"]
        );
    }
}

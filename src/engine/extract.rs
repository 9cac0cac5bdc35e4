//! Pull a fenced code block out of a model reply.

use regex::Regex;
use std::sync::OnceLock;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+#.\-]*)[^\n]*\n(.*?)```")
            .expect("fence regex compiles")
    })
}

/// An opening fence that runs to the end of the reply (truncated output).
fn open_fence_regex() -> &'static Regex {
    static OPEN: OnceLock<Regex> = OnceLock::new();
    OPEN.get_or_init(|| {
        Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+#.\-]*)[^\n]*\n(.*)\z")
            .expect("open fence regex compiles")
    })
}

/// Map info-string spellings onto one name per language.
fn canonical_lang(lang: &str) -> String {
    let lower = lang.trim().to_ascii_lowercase();
    match lower.as_str() {
        "py" | "python3" | "py3" => "python".to_string(),
        "htm" | "xhtml" => "html".to_string(),
        "js" | "node" | "mjs" => "javascript".to_string(),
        _ => lower,
    }
}

fn tidy(body: &str) -> String {
    let trimmed = body.trim_end().trim_start_matches(['\n', '\r']);
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}\n", trimmed)
    }
}

fn group<'h>(caps: &regex::Captures<'h>, i: usize) -> &'h str {
    caps.get(i).map(|m| m.as_str()).unwrap_or("")
}

/// Return the code the model meant to hand back.
///
/// Preference order:
/// 1. first block tagged with `lang` (aliases such as `py` count)
/// 2. first fenced block of any language
/// 3. the whole reply
///
/// A final block whose closing fence is missing still counts as a block,
/// running to the end of the reply.
pub fn extract_code_block(reply: &str, lang: &str) -> String {
    let wanted = canonical_lang(lang);
    let mut first_any: Option<&str> = None;
    let mut last_end = 0;
    let mut blocks: Vec<(&str, &str)> = Vec::new();

    for caps in fence_regex().captures_iter(reply) {
        if let Some(whole) = caps.get(0) {
            last_end = whole.end();
        }
        blocks.push((group(&caps, 1), group(&caps, 2)));
    }

    if let Some(caps) = open_fence_regex().captures(&reply[last_end..]) {
        tracing::debug!("reply ends inside an unclosed fence");
        blocks.push((group(&caps, 1), group(&caps, 2)));
    }

    for (tag, body) in blocks {
        if !wanted.is_empty() && canonical_lang(tag) == wanted {
            return tidy(body);
        }

        if first_any.is_none() {
            first_any = Some(body);
        }
    }

    match first_any {
        Some(body) => tidy(body),
        None => {
            tracing::debug!("no fenced block in reply; using the whole reply");
            tidy(reply.trim())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_block_with_requested_language() {
        let reply = "Here is a page:\n```html\n<p>hi</p>\n```\nand the server:\n```python\nprint('x')\n```\n";
        assert_eq!(extract_code_block(reply, "python"), "print('x')\n");
        assert_eq!(extract_code_block(reply, "html"), "<p>hi</p>\n");
    }

    #[test]
    fn language_aliases_match() {
        let reply = "```py\nprint(1)\n```";
        assert_eq!(extract_code_block(reply, "python"), "print(1)\n");

        let reply = "```Python\nprint(2)\n```";
        assert_eq!(extract_code_block(reply, "py"), "print(2)\n");
    }

    #[test]
    fn falls_back_to_first_block() {
        let reply = "Solution:\n```\ndef f():\n    return 1\n```\n```sql\nselect 1;\n```";
        assert_eq!(extract_code_block(reply, "python"), "def f():\n    return 1\n");
    }

    #[test]
    fn falls_back_to_whole_reply() {
        let reply = "\n  print('no fences')  \n";
        assert_eq!(extract_code_block(reply, "python"), "print('no fences')\n");
    }

    #[test]
    fn empty_reply_gives_empty_code() {
        assert_eq!(extract_code_block("", "python"), "");
    }

    #[test]
    fn keeps_indentation_inside_block() {
        let reply = "```python\n\nclass A:\n    def f(self):\n        pass\n\n```";
        assert_eq!(
            extract_code_block(reply, "python"),
            "class A:\n    def f(self):\n        pass\n"
        );
    }

    #[test]
    fn truncated_reply_keeps_body_of_open_fence() {
        let reply = "Here you go:\n```python\ndef solve():\n    return 42\nprint(solve())\n";
        assert_eq!(
            extract_code_block(reply, "python"),
            "def solve():\n    return 42\nprint(solve())\n"
        );
    }

    #[test]
    fn open_fence_after_closed_block_is_preferred_when_tagged() {
        let reply = "```html\n<p/>\n```\nnow the server:\n```python\nprint('up')\n";
        assert_eq!(extract_code_block(reply, "python"), "print('up')\n");
        assert_eq!(extract_code_block(reply, "html"), "<p/>\n");
    }

    #[test]
    fn tolerates_crlf_and_trailing_info() {
        let reply = "```python title=\"main.py\"\r\nprint(3)\r\n```";
        assert_eq!(extract_code_block(reply, "python"), "print(3)\n");
    }
}

/// 把连续空白折叠为单个空格，不分配中间 Vec
pub fn one_line(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut first = true;
    for word in s.split_whitespace() {
        if !first {
            result.push(' ');
        }
        result.push_str(word);
        first = false;
    }
    result
}

/// 截断到 max_chars 个字符并追加 "..."
pub fn truncate_clean(s: &str, max_chars: usize) -> String {
    let t = s.trim().replace("\r\n", "\n");

    // 快速路径：字节数 <= max_chars 时字符数必然 <= max_chars（UTF-8 性质）
    if t.len() <= max_chars {
        return t;
    }

    let truncated: String = t.chars().take(max_chars).collect();
    if truncated.len() == t.len() {
        truncated
    } else {
        format!("{} ...", truncated)
    }
}

/// 小写的字母数字词项，用于关键词召回
pub fn tokenize(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 1)
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_line() {
        assert_eq!(one_line("  a \n b\t c "), "a b c");
    }

    #[test]
    fn test_truncate_clean() {
        assert_eq!(truncate_clean("short", 10), "short");
        assert_eq!(truncate_clean("abcdefghij", 4), "abcd ...");
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Block my CARD, please! a"),
            vec!["block", "my", "card", "please"]
        );
    }
}

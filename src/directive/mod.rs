//! 指令协议：模型回复文本 → 结构化指令
//!
//! - parser：容错的标记解析（纯函数）
//! - vocabulary：各会话的封闭指令集与主指令互斥检查

pub mod parser;
pub mod vocabulary;

pub use parser::{normalize_name, parse, Directive, DirectiveMap, Occurrence};
pub use vocabulary::{
    classify, Classified, ControllerDirective, DirectiveSet, SearchDirective, WritingDirective,
};

/// 把 quick_search 的各次出现按逗号拆分成查询列表（trim，丢弃空串，保持顺序）
pub fn split_queries<'a>(occurrences: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    occurrences
        .into_iter()
        .flat_map(|o| o.split(','))
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .collect()
}

/// 把 webpage_read 的各次出现按逗号或换行拆分成 URL 列表
pub fn split_urls<'a>(occurrences: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    occurrences
        .into_iter()
        .flat_map(|o| o.split([',', '\n']))
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_queries() {
        assert_eq!(split_queries(["a, b", " ,c,"]), vec!["a", "b", "c"]);
        assert!(split_queries([" , "]).is_empty());
    }

    #[test]
    fn test_split_urls() {
        assert_eq!(
            split_urls(["https://a.com, https://b.com\nhttps://c.com\n"]),
            vec!["https://a.com", "https://b.com", "https://c.com"]
        );
    }
}

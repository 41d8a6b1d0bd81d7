//! 指令解析器
//!
//! 把模型回复文本解析成「指令名 → 按出现顺序的 (内容, 属性) 列表」。
//! 纯函数：无 I/O、无状态、不 panic、不返回错误；畸形标记就地降级为普通文本。
//!
//! 规则：
//! - 整段被单个围栏代码块包裹时先去掉围栏（可带语言标签，如 ```xml）；
//!   围栏前后夹杂说明文字时，指令区域之外的围栏标记直接跳过，其中的指令照常提取
//! - 反引号片段、指令区域内的三反引号代码块、CDATA、注释与处理指令都是不透明文本，其中的尖括号不算标记
//! - 区域内容取原始源码切片（去掉 CDATA 边界后 trim），因此 report 中的字面尖括号原样保留
//! - 指令名归一化：camelCase → snake_case，`-` → `_`，转小写
//! - 没有匹配开标签的闭标签是文本；匹配到更深层开标签的闭标签会关闭它，中间未闭合的开标签丢弃，
//!   其已完成的子区域上提；末尾未闭合的区域丢弃（同样上提已完成的子区域）
//! - 先序遍历输出；空白内容的区域不进入映射，只记入 blank 集合

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;

/// 单次出现：trim 后的内容与原样捕获的属性
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Occurrence {
    pub content: String,
    pub attributes: BTreeMap<String, String>,
}

/// 一个指令名的全部出现（按出现顺序，至少一个）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub name: String,
    pub occurrences: Vec<Occurrence>,
}

impl Directive {
    /// 第一条出现的内容
    pub fn first(&self) -> &str {
        self.occurrences
            .first()
            .map(|o| o.content.as_str())
            .unwrap_or_default()
    }

    pub fn contents(&self) -> impl Iterator<Item = &str> {
        self.occurrences.iter().map(|o| o.content.as_str())
    }
}

/// 解析结果
///
/// 出现在映射中的名字至少有一条非空内容；只出现过空白内容的名字记在 blank 集合里，
/// 供调度层识别「空委派」。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectiveMap {
    directives: BTreeMap<String, Directive>,
    blank: BTreeSet<String>,
}

impl DirectiveMap {
    pub fn get(&self, name: &str) -> Option<&Directive> {
        self.directives.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.directives.contains_key(name)
    }

    /// 第一条非空出现的内容
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).map(Directive::first)
    }

    /// 某指令的全部内容（不存在时为空迭代器）
    pub fn contents<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.directives
            .get(name)
            .into_iter()
            .flat_map(|d| d.occurrences.iter().map(|o| o.content.as_str()))
    }

    /// 该标记出现过且至少有一次内容为空白
    pub fn is_blank(&self, name: &str) -> bool {
        self.blank.contains(name)
    }

    /// 出现过（无论内容是否为空白）
    pub fn is_surfaced(&self, name: &str) -> bool {
        self.contains(name) || self.is_blank(name)
    }

    /// 所有出现过的名字（含仅空白的），按字典序
    pub fn surfaced_names(&self) -> impl Iterator<Item = &str> {
        let present: BTreeSet<&str> = self
            .directives
            .keys()
            .map(String::as_str)
            .chain(self.blank.iter().map(String::as_str))
            .collect();
        present.into_iter()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Directive> {
        self.directives.values()
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    fn push(&mut self, name: String, content: &str, attributes: BTreeMap<String, String>) {
        let content = content.trim();
        if content.is_empty() {
            self.blank.insert(name);
            return;
        }
        self.directives
            .entry(name.clone())
            .or_insert_with(|| Directive {
                name,
                occurrences: Vec::new(),
            })
            .occurrences
            .push(Occurrence {
                content: content.to_string(),
                attributes,
            });
    }
}

/// 解析模型回复
pub fn parse(text: &str) -> DirectiveMap {
    let body = strip_envelope(text);
    let roots = build_tree(body);

    let mut map = DirectiveMap::default();
    for node in &roots {
        walk(node, &mut map);
    }
    map
}

/// 指令名归一化：camelCase → snake_case，`-` → `_`，小写
pub fn normalize_name(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '-' {
            out.push('_');
            continue;
        }
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_lower)
            {
                if !out.ends_with('_') {
                    out.push('_');
                }
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// 去掉包裹整段回复的单个围栏代码块；未被整体包裹时原样返回
fn strip_envelope(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") || !trimmed.ends_with("```") || trimmed.len() < 6 {
        return trimmed;
    }
    let Some(first_nl) = trimmed.find('\n') else {
        return trimmed;
    };
    // 开围栏行只允许语言标签
    let tag = trimmed[3..first_nl].trim();
    if tag.contains('`') || tag.contains('<') {
        return trimmed;
    }
    let end = trimmed.len() - 3;
    if end < first_nl + 1 {
        return trimmed;
    }
    let body = &trimmed[first_nl + 1..end];
    if body.lines().any(|l| l.trim_start().starts_with("```")) {
        tracing::debug!("reply envelope contains nested or multiple fences, parsing best-effort");
    }
    body
}

#[derive(Debug)]
struct Node {
    name: String,
    attributes: BTreeMap<String, String>,
    content: String,
    children: Vec<Node>,
}

struct Frame {
    name: String,
    attributes: BTreeMap<String, String>,
    content_start: usize,
    children: Vec<Node>,
}

fn open_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"^<([A-Za-z_][A-Za-z0-9_.:\-]*)((?:\s+[^\s=<>/"']+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'<>=`]+))?)*)\s*(/?)>"#,
        )
        .unwrap()
    })
}

fn close_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^</([A-Za-z_][A-Za-z0-9_.:\-]*)\s*>").unwrap())
}

fn attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([^\s=<>/"']+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'<>=`]+)))?"#).unwrap()
    })
}

fn parse_attributes(raw: &str) -> BTreeMap<String, String> {
    attribute_re()
        .captures_iter(raw)
        .map(|c| {
            let value = c
                .get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            (c[1].to_string(), value)
        })
        .collect()
}

/// 从 from 起查找 needle，返回其起始位置
fn find_from(s: &str, from: usize, needle: &str) -> Option<usize> {
    s.get(from..)?.find(needle).map(|p| p + from)
}

/// 跳过顶层围栏标记（```` ``` ```` 加可选语言标签），返回其后的位置
///
/// 回复前后夹杂说明文字时整体剥壳不生效，围栏本身在这里被当作透明。
fn skip_fence_marker(s: &str, i: usize) -> usize {
    let bytes = s.as_bytes();
    let mut j = i;
    while j < bytes.len() && bytes[j] == b'`' {
        j += 1;
    }
    while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || b"-_+.".contains(&bytes[j])) {
        j += 1;
    }
    j
}

/// 若 i 处是不透明片段的开头，返回片段结束后的位置
fn skip_opaque(s: &str, i: usize) -> Option<usize> {
    let rest = &s[i..];
    if rest.starts_with("```") {
        return find_from(s, i + 3, "```").map(|end| end + 3);
    }
    if rest.starts_with('`') {
        // 行内代码不跨行
        let line_end = find_from(s, i + 1, "\n").unwrap_or(s.len());
        return find_from(s, i + 1, "`")
            .filter(|&end| end < line_end)
            .map(|end| end + 1);
    }
    if rest.starts_with("<![CDATA[") {
        return Some(find_from(s, i + 9, "]]>").map_or(s.len(), |end| end + 3));
    }
    if rest.starts_with("<!--") {
        return Some(find_from(s, i + 4, "-->").map_or(s.len(), |end| end + 3));
    }
    if rest.starts_with("<!") {
        return Some(find_from(s, i + 2, ">").map_or(s.len(), |end| end + 1));
    }
    if rest.starts_with("<?") {
        return Some(find_from(s, i + 2, "?>").map_or(s.len(), |end| end + 2));
    }
    None
}

fn build_tree(body: &str) -> Vec<Node> {
    let bytes = body.as_bytes();
    let mut root: Vec<Node> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b != b'<' && b != b'`' {
            i += 1;
            continue;
        }
        // 指令区域之外的围栏只是外壳；区域内的代码块保持不透明
        if stack.is_empty() && body[i..].starts_with("```") {
            i = skip_fence_marker(body, i);
            continue;
        }
        if let Some(next) = skip_opaque(body, i) {
            i = next;
            continue;
        }
        if b == b'`' {
            i += 1;
            continue;
        }

        let rest = &body[i..];
        if let Some(caps) = close_tag_re().captures(rest) {
            let tag_len = caps[0].len();
            let name = normalize_name(&caps[1]);
            match stack.iter().rposition(|f| f.name == name) {
                Some(depth) => {
                    while stack.len() > depth + 1 {
                        if let Some(dropped) = stack.pop() {
                            tracing::debug!(name = %dropped.name, "dropping unterminated directive");
                            adopt(&mut stack, &mut root, dropped.children);
                        }
                    }
                    if let Some(frame) = stack.pop() {
                        let node = Node {
                            name: frame.name,
                            attributes: frame.attributes,
                            content: strip_cdata_markers(&body[frame.content_start..i]),
                            children: frame.children,
                        };
                        adopt(&mut stack, &mut root, vec![node]);
                    }
                }
                None => tracing::debug!(name = %name, "stray closing tag treated as text"),
            }
            i += tag_len;
            continue;
        }

        if let Some(caps) = open_tag_re().captures(rest) {
            let tag_len = caps[0].len();
            let name = normalize_name(&caps[1]);
            let attributes = parse_attributes(caps.get(2).map_or("", |m| m.as_str()));
            let self_closing = caps.get(3).is_some_and(|m| m.as_str() == "/");
            if self_closing {
                let node = Node {
                    name,
                    attributes,
                    content: String::new(),
                    children: Vec::new(),
                };
                adopt(&mut stack, &mut root, vec![node]);
            } else {
                stack.push(Frame {
                    name,
                    attributes,
                    content_start: i + tag_len,
                    children: Vec::new(),
                });
            }
            i += tag_len;
            continue;
        }

        i += 1;
    }

    while let Some(dropped) = stack.pop() {
        tracing::debug!(name = %dropped.name, "dropping unterminated tail");
        adopt(&mut stack, &mut root, dropped.children);
    }
    root
}

/// 把完成的节点挂到当前栈顶（栈空时挂到根）
fn adopt(stack: &mut [Frame], root: &mut Vec<Node>, nodes: Vec<Node>) {
    match stack.last_mut() {
        Some(parent) => parent.children.extend(nodes),
        None => root.extend(nodes),
    }
}

/// 去掉 CDATA 边界标记，保留其中文本
fn strip_cdata_markers(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("<![CDATA[") {
        out.push_str(&rest[..start]);
        let inner = &rest[start + 9..];
        match inner.find("]]>") {
            Some(end) => {
                out.push_str(&inner[..end]);
                rest = &inner[end + 3..];
            }
            None => {
                out.push_str(inner);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn walk(node: &Node, map: &mut DirectiveMap) {
    map.push(node.name.clone(), &node.content, node.attributes.clone());
    for child in &node.children {
        walk(child, map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(map: &DirectiveMap, name: &str) -> Vec<String> {
        map.contents(name).map(str::to_string).collect()
    }

    #[test]
    fn test_fenced_ask_user() {
        let map = parse("```xml\n<message_ask_user>Hi</message_ask_user>\n```");
        assert_eq!(map.len(), 1);
        assert_eq!(contents(&map, "message_ask_user"), vec!["Hi"]);
        assert!(map.get("message_ask_user").unwrap().occurrences[0]
            .attributes
            .is_empty());
    }

    #[test]
    fn test_unfenced_text_parsed_as_is() {
        let map = parse("Sure.\n<planning>step 1</planning>\nthen <quick_search>rust</quick_search>");
        assert_eq!(map.first("planning"), Some("step 1"));
        assert_eq!(map.first("quick_search"), Some("rust"));
    }

    #[test]
    fn test_fence_with_surrounding_prose() {
        let before = parse("Sure, here is my reply:\n```xml\n<message_ask_user>Hi</message_ask_user>\n```");
        assert_eq!(before.first("message_ask_user"), Some("Hi"));

        let after = parse("```xml\n<quick_search>a, b</quick_search>\n```\nLet me know.");
        assert_eq!(after.first("quick_search"), Some("a, b"));

        let both = parse("Plan:\n```\n<planning>p</planning>\n```\nand then\n```xml\n<report>r</report>\n```\nDone.");
        assert_eq!(both.first("planning"), Some("p"));
        assert_eq!(both.first("report"), Some("r"));
    }

    #[test]
    fn test_fence_inside_directive_stays_opaque_with_prose_outside() {
        let text = "Here:\n```xml\n<report>\n```rust\nlet x = \"<planning>\";\n```\n</report>\n```";
        let map = parse(text);
        assert!(!map.contains("planning"));
        assert_eq!(
            map.first("report"),
            Some("```rust\nlet x = \"<planning>\";\n```")
        );
    }

    #[test]
    fn test_no_directives_gives_empty_map() {
        assert!(parse("just prose, 1 < 2 and 3 > 2").is_empty());
        assert!(parse("").is_empty());
        assert!(parse("```\n```").is_empty());
    }

    #[test]
    fn test_repeated_occurrences_keep_order() {
        let map = parse("<quick_search>a</quick_search><x>1</x><quick_search>b</quick_search>");
        assert_eq!(contents(&map, "quick_search"), vec!["a", "b"]);
        assert_eq!(map.first("x"), Some("1"));
    }

    #[test]
    fn test_name_normalization() {
        assert_eq!(normalize_name("quickSearch"), "quick_search");
        assert_eq!(normalize_name("message-ask-user"), "message_ask_user");
        assert_eq!(normalize_name("TODO_LIST"), "todo_list");
        assert_eq!(normalize_name("WebpageRead"), "webpage_read");
        assert_eq!(normalize_name("HTTPServer"), "http_server");

        let map = parse("<SearchAgent>topic</SearchAgent><todo-list>- a</todo-list>");
        assert_eq!(map.first("search_agent"), Some("topic"));
        assert_eq!(map.first("todo_list"), Some("- a"));
    }

    #[test]
    fn test_attributes_captured_verbatim() {
        let map = parse(r#"<report format="md" lang='zh' level=2 draft>body</report>"#);
        let attrs = &map.get("report").unwrap().occurrences[0].attributes;
        assert_eq!(attrs.get("format").map(String::as_str), Some("md"));
        assert_eq!(attrs.get("lang").map(String::as_str), Some("zh"));
        assert_eq!(attrs.get("level").map(String::as_str), Some("2"));
        assert_eq!(attrs.get("draft").map(String::as_str), Some(""));
    }

    #[test]
    fn test_report_keeps_raw_inner_markup_and_extracts_children() {
        let text = "<report>\n# Title\nUse <b>bold</b> & <br> tags.\n</report>";
        let map = parse(text);
        assert_eq!(
            map.first("report"),
            Some("# Title\nUse <b>bold</b> & <br> tags.")
        );
        // 子区域同样提取（先序：report 先于 b）
        assert_eq!(map.first("b"), Some("bold"));
        assert!(!map.contains("br"));
    }

    #[test]
    fn test_nested_directives_pre_order() {
        let map = parse("<outer><inner>x</inner><inner>y</inner></outer>");
        assert_eq!(map.first("outer"), Some("<inner>x</inner><inner>y</inner>"));
        assert_eq!(contents(&map, "inner"), vec!["x", "y"]);
    }

    #[test]
    fn test_backticks_are_opaque() {
        let text = "<report>Write `<quick_search>` to search.\n```\n<webpage_read>u</webpage_read>\n```\n</report>";
        let map = parse(text);
        assert!(!map.contains("quick_search"));
        assert!(!map.contains("webpage_read"));
        assert!(map.first("report").unwrap().contains("`<quick_search>`"));
    }

    #[test]
    fn test_unmatched_backtick_does_not_swallow_markup() {
        let map = parse("it`s fine\n<todo_list>- a</todo_list>");
        assert_eq!(map.first("todo_list"), Some("- a"));
    }

    #[test]
    fn test_cdata_is_opaque_and_markers_stripped() {
        let map = parse("<report><![CDATA[a <quick_search>x</quick_search> b]]></report>");
        assert_eq!(map.first("report"), Some("a <quick_search>x</quick_search> b"));
        assert!(!map.contains("quick_search"));
    }

    #[test]
    fn test_comments_and_processing_instructions_are_text() {
        let map = parse("<?xml version=\"1.0\"?><!-- <planning>no</planning> --><planning>yes</planning>");
        assert_eq!(contents(&map, "planning"), vec!["yes"]);
    }

    #[test]
    fn test_stray_close_is_text() {
        let map = parse("</report><planning>p</planning></planning>");
        assert_eq!(contents(&map, "planning"), vec!["p"]);
        assert!(!map.contains("report"));
    }

    #[test]
    fn test_mismatched_close_drops_unterminated_and_promotes_children() {
        let map = parse("<report>a <open>b <leaf>c</leaf> d</report>");
        assert_eq!(map.first("report"), Some("a <open>b <leaf>c</leaf> d"));
        assert!(!map.contains("open"));
        assert_eq!(map.first("leaf"), Some("c"));
    }

    #[test]
    fn test_unterminated_tail_dropped() {
        let map = parse("<planning>p</planning><report>never closed <x>1</x>");
        assert_eq!(map.first("planning"), Some("p"));
        assert!(!map.contains("report"));
        assert_eq!(map.first("x"), Some("1"));
    }

    #[test]
    fn test_blank_regions_recorded_separately() {
        let map = parse("<search_agent>   \n </search_agent><writing_agent/>");
        assert!(map.is_empty());
        assert!(map.is_blank("search_agent"));
        assert!(map.is_blank("writing_agent"));
        assert!(map.is_surfaced("search_agent"));
        assert!(!map.is_surfaced("report"));
    }

    #[test]
    fn test_present_keys_never_have_empty_lists() {
        let map = parse("<a></a><a>x</a><b> </b><c>y</c>");
        for d in map.iter() {
            assert!(!d.occurrences.is_empty());
            assert!(d.occurrences.iter().all(|o| !o.content.is_empty()));
        }
        assert_eq!(contents(&map, "a"), vec!["x"]);
        assert!(map.is_blank("a"));
    }

    #[test]
    fn test_round_trip_preserves_content() {
        let original = [
            ("report", "Line 1\n\n| a | b |\n|---|---|\n| <1 | 2> |"),
            ("todo_list", "- [ ] search\n- [x] write"),
            ("message_ask_user", "要继续吗？"),
        ];
        let text: String = original
            .iter()
            .map(|(n, c)| format!("<{n}>\n{c}\n</{n}>\n"))
            .collect();
        let first = parse(&text);

        let reserialized: String = first
            .iter()
            .flat_map(|d| {
                d.occurrences
                    .iter()
                    .map(move |o| format!("<{}>{}</{}>", d.name, o.content, d.name))
            })
            .collect();
        let second = parse(&reserialized);

        for (name, content) in original {
            assert_eq!(first.first(name), Some(content));
            assert_eq!(second.first(name), Some(content));
        }
    }

    #[test]
    fn test_unbalanced_inputs_terminate() {
        let inputs = [
            "<<<<>>>>",
            "<a><b><c>",
            "</a></b></c>",
            "<a></b></a></a>",
            "```",
            "``````",
            "<![CDATA[ never closed",
            "<!-- never closed",
            "<a x=\"unterminated>text</a>",
            "<中文>内容</中文>",
            "<a>`</a>`",
        ];
        for input in inputs {
            let _ = parse(input);
        }
    }

    #[test]
    fn test_nested_fence_in_envelope_is_best_effort() {
        let text = "```xml\n<report>\n```rust\nfn main() {}\n```\n</report>\n```";
        let map = parse(text);
        assert_eq!(map.first("report"), Some("```rust\nfn main() {}\n```"));
    }
}

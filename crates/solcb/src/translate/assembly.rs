//! Text rendering of legacy assembly JSON

use serde_json::Value;

const EXCERPT_LEN: usize = 30;

/// Render `assembly` the way old compilers printed `--asm`
///
/// When `source` is given, each instruction is followed by the escaped
/// source range it was generated from.
pub fn pretty_print_legacy_assembly(assembly: &Value, source: Option<&str>) -> String {
    let mut text = String::new();
    format_assembly(&mut text, assembly, "", source);
    text
}

fn format_assembly(text: &mut String, assembly: &Value, prefix: &str, source: Option<&str>) {
    let Value::Object(fields) = assembly else {
        let line = match assembly {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        text.push_str(&format!("{prefix}{line}\n"));
        return;
    };

    text.push_str(&format!("{prefix}.code\n"));
    for item in fields.get(".code").and_then(Value::as_array).into_iter().flatten() {
        let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
        let value = match item.get("value") {
            None => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        let excerpt = source.map(|source| excerpt(source, item)).unwrap_or_default();
        if name != "tag" {
            text.push_str("  ");
        }
        text.push_str(&format!("{prefix}{name} {value}\t\t\t{excerpt}\n"));
    }

    text.push_str(&format!("{prefix}.data\n"));
    if let Some(Value::Object(data)) = fields.get(".data") {
        let mut entries: Vec<_> = data.iter().collect();
        // Numeric indices in ascending order, anything else after them.
        entries.sort_by_key(|(key, _)| (key.parse::<u64>().unwrap_or(u64::MAX), key.to_string()));
        let nested = format!("{prefix}    ");
        for (index, item) in entries {
            text.push_str(&format!("  {prefix}{index}:\n"));
            format_assembly(text, item, &nested, source);
        }
    }
}

fn excerpt(source: &str, item: &Value) -> String {
    let begin = item.get("begin").and_then(Value::as_u64);
    let end = item.get("end").and_then(Value::as_u64);
    let (Some(begin), Some(end)) = (begin, end) else {
        return String::new();
    };
    // Offsets are in bytes of the UTF-8 source.
    let snippet = source
        .as_bytes()
        .get(begin as usize..end as usize)
        .map(String::from_utf8_lossy)
        .unwrap_or_default();
    let escaped = snippet.replace('\n', "\\n").replace('\r', "\\r").replace('\t', "\\t");
    if escaped.chars().count() > EXCERPT_LEN {
        let truncated: String = escaped.chars().take(EXCERPT_LEN).collect();
        format!("{truncated}...")
    } else {
        escaped
    }
}

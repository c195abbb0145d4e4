//! Source normalization.
//!
//! The guest evaluates the program as a classic script sharing one global
//! scope with the injected runtime, so module syntax has to go. The program is
//! also spliced verbatim into an inert `<script type="text/plain">` element,
//! where the HTML tokenizer would end the element early on `</script` and
//! switch into escaped state on `<!--`.
//!
//! Only lines that parse as real import/export declarations are touched. A
//! line that merely starts with the word `import` (JSX text, template literal
//! content) is left alone.

use regex::Regex;
use std::sync::OnceLock;

/// Accepted entry component names, in priority order. The first one the
/// program defines is mounted; the rest are ignored.
pub const ROOT_SYMBOLS: [&str; 4] = ["App", "Preview", "Component", "Page"];

struct Patterns {
    import_line: Regex,
    import_side_effect: Regex,
    import_block_start: Regex,
    import_block_end: Regex,
    export_block_start: Regex,
    export_block_end: Regex,
    binding_line: Regex,
    export_default_ident: Regex,
    export_list: Regex,
    export_star: Regex,
    export_default_anon_fn: Regex,
    export_default_anon_class: Regex,
    export_default_decl: Regex,
    export_default_expr: Regex,
    export_keyword: Regex,
    root_declaration: Regex,
    script_close: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |pattern: &str| Regex::new(pattern).expect("static pattern");
        Patterns {
            // `import x from 'm'`, `import x, { a } from 'm'`, `import * as x from 'm'`
            import_line: re(
                r#"^\s*import\s+(?:type\s+)?(?:[\w$]+\s*,?\s*)?(?:\{[^}]*\}|\*\s*as\s+[\w$]+)?\s*from\s*['"][^'"]*['"]\s*;?\s*$"#,
            ),
            import_side_effect: re(r#"^\s*import\s*['"][^'"]*['"]\s*;?\s*$"#),
            import_block_start: re(r#"^\s*import\s+(?:type\s+)?(?:[\w$]+\s*,\s*)?\{[^}'"]*$"#),
            import_block_end: re(r#"^[^{}'"]*\}\s*from\s*['"][^'"]*['"]\s*;?\s*$"#),
            export_block_start: re(r#"^\s*export\s*\{[^}'"]*$"#),
            export_block_end: re(r#"^[^{}'"]*\}\s*(?:from\s*['"][^'"]*['"])?\s*;?\s*$"#),
            // Inside an open `{ .. }` binding list: names, `a as b`, commas.
            binding_line: re(r"^\s*(?:[\w$]+(?:\s+as\s+[\w$]+)?\s*,\s*)*(?:[\w$]+(?:\s+as\s+[\w$]+)?\s*)?$"),
            export_default_ident: re(r"^\s*export\s+default\s+[A-Za-z_$][\w$]*\s*;?\s*$"),
            export_list: re(r#"^\s*export\s*\{[^}]*\}\s*(?:from\s*['"][^'"]*['"])?\s*;?\s*$"#),
            export_star: re(r#"^\s*export\s*\*\s*(?:as\s+[\w$]+\s*)?from\s*['"][^'"]*['"]\s*;?\s*$"#),
            export_default_anon_fn: re(r"^(\s*)export\s+default\s+(async\s+)?function\s*(\*?)\s*\("),
            export_default_anon_class: re(r"^(\s*)export\s+default\s+class(\s*\{|\s+extends\b)"),
            export_default_decl: re(r"^(\s*)export\s+default\s+((?:async\s+)?function\b|class\b)"),
            export_default_expr: re(r"^(\s*)export\s+default\s+"),
            export_keyword: re(r"^(\s*)export\s+"),
            root_declaration: re(&format!(
                r"\b(?:function|class|const|let|var)\s*\*?\s+({})\b",
                ROOT_SYMBOLS.join("|")
            )),
            script_close: re(r"(?i)</(script)"),
        }
    })
}

/// Full normalization: module stripping followed by script-data escaping.
///
/// Idempotent: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(source: &str) -> String {
    escape_script_data(&strip_modules(source))
}

#[derive(Clone, Copy)]
enum Block {
    Import,
    Export,
}

/// Remove import declarations (including multi-line ones) and turn exports
/// into plain declarations. `export default Name;`, `export { .. }` and
/// `export * from ..` lines are dropped entirely. An anonymous default export
/// is bound to the first root symbol the program does not already declare.
pub fn strip_modules(source: &str) -> String {
    let p = patterns();
    let default_name = free_root_symbol(source);
    let mut out = String::with_capacity(source.len());
    let mut open: Option<(Block, Vec<&str>)> = None;

    for line in source.split_inclusive('\n') {
        let body = line.trim_end_matches(['\n', '\r']);

        if let Some((block, mut held)) = open.take() {
            let closes = match block {
                Block::Import => p.import_block_end.is_match(body),
                Block::Export => p.export_block_end.is_match(body),
            };
            if closes {
                continue;
            }
            if p.binding_line.is_match(body) {
                held.push(line);
                open = Some((block, held));
                continue;
            }
            // Not a binding list after all; the held lines are user code.
            held.into_iter().for_each(|h| out.push_str(h));
        }

        if p.import_line.is_match(body)
            || p.import_side_effect.is_match(body)
            || p.export_default_ident.is_match(body)
            || p.export_list.is_match(body)
            || p.export_star.is_match(body)
        {
            continue;
        }
        if p.import_block_start.is_match(body) {
            open = Some((Block::Import, vec![line]));
            continue;
        }
        if p.export_block_start.is_match(body) {
            open = Some((Block::Export, vec![line]));
            continue;
        }

        out.push_str(&rewrite_export(p, line, default_name));
    }

    if let Some((_, held)) = open {
        held.into_iter().for_each(|h| out.push_str(h));
    }
    out
}

fn rewrite_export(p: &Patterns, line: &str, default_name: Option<&str>) -> String {
    if let Some(name) = default_name {
        if p.export_default_anon_fn.is_match(line) {
            let to = format!("${{1}}${{2}}function${{3}} {}(", name);
            return p.export_default_anon_fn.replace(line, to.as_str()).into_owned();
        }
        if p.export_default_anon_class.is_match(line) {
            let to = format!("${{1}}class {}${{2}}", name);
            return p.export_default_anon_class.replace(line, to.as_str()).into_owned();
        }
    }
    if p.export_default_decl.is_match(line) {
        return p.export_default_decl.replace(line, "${1}${2}").into_owned();
    }
    if p.export_default_expr.is_match(line) {
        let to = match default_name {
            Some(name) => format!("${{1}}var {} = ", name),
            None => "${1}".to_string(),
        };
        return p.export_default_expr.replace(line, to.as_str()).into_owned();
    }
    p.export_keyword.replace(line, "${1}").into_owned()
}

/// First root symbol with no declaration in `source`.
fn free_root_symbol(source: &str) -> Option<&'static str> {
    let declared: Vec<&str> = patterns()
        .root_declaration
        .captures_iter(source)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    ROOT_SYMBOLS.iter().copied().find(|name| !declared.contains(name))
}

/// Neutralize `</script` and `<!--` so the program cannot terminate or
/// confuse the element it is embedded in. Both rewrites are no-ops inside JS
/// string and regex literals. Already-escaped text never matches again.
pub fn escape_script_data(source: &str) -> String {
    let p = patterns();
    let escaped = p.script_close.replace_all(source, "<\\/$1");
    escaped.replace("<!--", "<\\!--")
}

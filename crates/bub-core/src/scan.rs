//! The include/import scanner (`spec.md` §3 "Include/import scanner").
//!
//! Extracts in-project includes from C-family files (`#include "…"`) and
//! imports from D-family files, skipping angle-bracket C includes and
//! imports naming a configured-external module.

use std::path::Path;

use regex::Regex;
use std::sync::LazyLock;

static C_INCLUDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*#\s*include\s*"([^"]+)""#).unwrap());

static D_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+([A-Za-z_][A-Za-z0-9_.]*)\s*;").unwrap());

const C_FAMILY_EXTS: &[&str] = &["c", "h", "cpp", "hpp", "cc", "hh", "cxx", "hxx"];
const D_FAMILY_EXTS: &[&str] = &["d"];

/// Scan `text` (the contents of the file at `path`) for in-project
/// dependencies, resolving D module dotted-paths to `a/b/c.d`-shaped
/// relative paths. `external_modules` names D import roots that are
/// configured as external (e.g. `std`) and therefore skipped.
pub fn scan_file(path: &Path, text: &str, external_modules: &[String]) -> Vec<String> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if C_FAMILY_EXTS.contains(&ext) {
        scan_c_includes(text)
    } else if D_FAMILY_EXTS.contains(&ext) {
        scan_d_imports(text, external_modules)
    } else {
        Vec::new()
    }
}

fn scan_c_includes(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| C_INCLUDE.captures(line))
        .map(|cap| cap[1].to_string())
        .collect()
}

fn scan_d_imports(text: &str, external_modules: &[String]) -> Vec<String> {
    text.lines()
        .filter_map(|line| D_IMPORT.captures(line))
        .map(|cap| cap[1].to_string())
        .filter(|module| {
            !external_modules
                .iter()
                .any(|ext| module == ext || module.starts_with(&format!("{ext}.")))
        })
        .map(|module| format!("{}.d", module.replace('.', "/")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_quote_include_is_extracted() {
        let text = "#include \"p/lo/lo.h\"\n#include <stdio.h>\n";
        assert_eq!(scan_c_includes(text), vec!["p/lo/lo.h".to_string()]);
    }

    #[test]
    fn c_angle_include_is_skipped() {
        let text = "#include <vector>\n";
        assert!(scan_c_includes(text).is_empty());
    }

    #[test]
    fn d_import_resolves_to_relative_path() {
        let text = "import p.lo.lo;\n";
        assert_eq!(scan_d_imports(text, &[]), vec!["p/lo/lo.d".to_string()]);
    }

    #[test]
    fn d_import_of_configured_external_is_skipped() {
        let text = "import std.stdio;\n";
        assert!(scan_d_imports(text, &["std".to_string()]).is_empty());
    }

    #[test]
    fn scan_file_dispatches_by_extension() {
        assert_eq!(
            scan_file(Path::new("foo.cpp"), "#include \"a.h\"\n", &[]),
            vec!["a.h".to_string()]
        );
        assert_eq!(
            scan_file(Path::new("foo.txt"), "#include \"a.h\"\n", &[]),
            Vec::<String>::new()
        );
    }
}

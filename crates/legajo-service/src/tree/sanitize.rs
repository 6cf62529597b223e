//! Name and path hygiene for tree operations.
//!
//! Every caller-supplied file name passes through [`sanitize_file_name`]
//! before it becomes part of a logical path, so a path never contains
//! separators, control characters or shell metacharacters smuggled in
//! through an upload.

use chrono::Utc;

/// Characters kept verbatim besides alphanumerics.
const KEPT_PUNCTUATION: &[char] = &['.', '-', '_'];

/// Split a slash-separated logical path into its segments.
///
/// Empty segments produced by leading, trailing or doubled slashes are
/// dropped rather than rejected.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Sanitize a caller-supplied file or folder name.
///
/// Keeps alphanumerics (any script), dots, dashes and underscores;
/// whitespace runs collapse to a single underscore; everything else is
/// stripped. A name reduced to nothing gets a synthetic timestamped
/// replacement so the operation still succeeds.
pub fn sanitize_file_name(name: &str) -> String {
    let filtered: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || KEPT_PUNCTUATION.contains(&c) {
                c
            } else {
                ' '
            }
        })
        .collect();

    let joined = filtered.split_whitespace().collect::<Vec<_>>().join("_");
    // Stripped characters next to a dot would otherwise leave a stray
    // underscore against the extension boundary.
    let joined = joined.replace("_.", ".").replace("._", ".");
    let trimmed = joined.trim_matches(|c| c == '.' || c == '_');

    if trimmed.is_empty() {
        synthetic_name()
    } else {
        trimmed.to_string()
    }
}

/// Sanitize a download archive name and guarantee a `.zip` suffix.
pub fn sanitize_archive_name(name: &str) -> String {
    let base = sanitize_file_name(name);
    if base.to_lowercase().ends_with(".zip") {
        base
    } else {
        format!("{base}.zip")
    }
}

/// Extract the lower-cased extension from a sanitized file name.
///
/// Dotfiles ("`.gitignore`") and extensionless names yield `None`.
pub fn extension_of(name: &str) -> Option<String> {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext.to_lowercase()),
        _ => None,
    }
}

fn synthetic_name() -> String {
    format!("unnamed_{}", Utc::now().format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_unsafe_characters_and_joins_with_underscores() {
        assert_eq!(
            sanitize_file_name("Informe Mensual #1.pdf"),
            "Informe_Mensual_1.pdf"
        );
        assert_eq!(sanitize_file_name("a/b\\c:d*e?.txt"), "a_b_c_d_e.txt");
    }

    #[test]
    fn no_stray_underscores_around_the_extension_dot() {
        assert_eq!(sanitize_file_name("borrador ?. final.txt"), "borrador.final.txt");
        assert_eq!(sanitize_file_name("acta #.pdf"), "acta.pdf");
    }

    #[test]
    fn keeps_accented_names() {
        assert_eq!(sanitize_file_name("nómina año 2025.xlsx"), "nómina_año_2025.xlsx");
    }

    #[test]
    fn empty_names_get_a_synthetic_replacement() {
        let name = sanitize_file_name("###");
        assert!(name.starts_with("unnamed_"));
        assert!(name.len() > "unnamed_".len());
    }

    #[test]
    fn archive_names_always_end_in_zip() {
        assert_eq!(sanitize_archive_name("Empleados"), "Empleados.zip");
        assert_eq!(sanitize_archive_name("backup.ZIP"), "backup.ZIP");
    }

    #[test]
    fn path_splitting_drops_empty_segments() {
        assert_eq!(split_path("/hr//Empleados/"), vec!["hr", "Empleados"]);
        assert!(split_path("///").is_empty());
    }

    #[test]
    fn extensions_are_lowercased_and_dotfiles_excluded() {
        assert_eq!(extension_of("Contrato.PDF"), Some("pdf".to_string()));
        assert_eq!(extension_of(".gitignore"), None);
        assert_eq!(extension_of("README"), None);
    }
}

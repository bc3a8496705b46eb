//! Conflict copy naming
//!
//! Keep-both resolution renames the local version before uploading it, so
//! both versions survive side by side. Names follow the pattern
//! `filename (conflicted copy YYYY-MM-DD XXXXXXXX).ext`.

use chrono::Utc;
use uuid::Uuid;

/// Generates unique file names for conflict copies
pub struct ConflictNamer;

impl ConflictNamer {
    /// Produces a conflict copy name for `original_name`
    ///
    /// Given "report.docx", produces something like
    /// "report (conflicted copy 2026-08-30 a1b2c3d4).docx".
    pub fn generate(original_name: &str) -> String {
        let date = Utc::now().format("%Y-%m-%d");
        let short_uuid = &Uuid::new_v4().to_string()[..8];

        match split_extension(original_name) {
            Some((stem, ext)) => {
                format!("{stem} (conflicted copy {date} {short_uuid}){ext}")
            }
            None => format!("{original_name} (conflicted copy {date} {short_uuid})"),
        }
    }

    /// Like [`generate`](Self::generate), but avoids names `exists` reports
    ///
    /// UUID collisions are vanishingly rare; the numbered fallback exists
    /// so a caller retrying within one clock tick still gets a fresh name.
    pub fn generate_unique<F>(original_name: &str, mut exists: F) -> String
    where
        F: FnMut(&str) -> bool,
    {
        let candidate = Self::generate(original_name);
        if !exists(&candidate) {
            return candidate;
        }

        for i in 2..=99 {
            let numbered = match split_extension(&candidate) {
                Some((stem, ext)) => format!("{stem} {i}{ext}"),
                None => format!("{candidate} {i}"),
            };
            if !exists(&numbered) {
                return numbered;
            }
        }

        format!("{original_name}.conflict-{}", Uuid::new_v4())
    }
}

/// Splits "report.docx" into ("report", ".docx"); `None` without a dot
fn split_extension(name: &str) -> Option<(&str, &str)> {
    let dot = name.rfind('.')?;
    if dot == 0 {
        // Dotfiles like ".bashrc" have no extension to preserve
        return None;
    }
    Some((&name[..dot], &name[dot..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_with_extension() {
        let name = ConflictNamer::generate("report.docx");
        assert!(name.starts_with("report (conflicted copy "));
        assert!(name.ends_with(".docx"));
    }

    #[test]
    fn test_generate_without_extension() {
        let name = ConflictNamer::generate("Makefile");
        assert!(name.starts_with("Makefile (conflicted copy "));
        assert!(!name.contains('.'));
    }

    #[test]
    fn test_generate_dotfile_keeps_whole_name() {
        let name = ConflictNamer::generate(".gitignore");
        assert!(name.starts_with(".gitignore (conflicted copy "));
    }

    #[test]
    fn test_generate_unique_when_free() {
        let name = ConflictNamer::generate_unique("a.txt", |_| false);
        assert!(name.ends_with(".txt"));
    }

    #[test]
    fn test_generate_unique_numbers_on_collision() {
        let mut seen = 0;
        let name = ConflictNamer::generate_unique("a.txt", |_| {
            seen += 1;
            seen <= 1
        });
        assert!(name.contains(" 2.txt"), "got {name}");
    }

    #[test]
    fn test_two_generated_names_differ() {
        assert_ne!(
            ConflictNamer::generate("a.txt"),
            ConflictNamer::generate("a.txt")
        );
    }
}

//! Template directory expansion
//!
//! Copies a template tree into a target directory, replacing `{{ VARIABLE }}`
//! placeholders (optional whitespace inside the braces) in text files.
//! Binary files are copied unchanged; file permissions are preserved.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::{NoExpand, Regex};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template directory not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Filename patterns skipped by default during expansion.
pub const DEFAULT_SKIP_PATTERNS: [&str; 4] = [".git", ".gitignore", "__pycache__", "*.pyc"];

/// Replace every `{{ NAME }}` occurrence with the mapped value. Unmapped
/// placeholders are left untouched.
pub fn expand_placeholders(text: &str, variables: &HashMap<String, String>) -> String {
    let mut result = text.to_string();
    for (name, value) in variables {
        let pattern = format!(r"\{{\{{\s*{}\s*\}}\}}", regex::escape(name));
        // The escaped variable name always yields a valid pattern.
        let placeholder = Regex::new(&pattern).expect("placeholder pattern");
        result = placeholder
            .replace_all(&result, NoExpand(value.as_str()))
            .into_owned();
    }
    result
}

fn matches_pattern(name: &str, pattern: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(extension) => name.ends_with(&format!(".{}", extension)),
        None => name == pattern,
    }
}

/// Expand `template_dir` into `target_dir` with variable substitution.
/// `skip_patterns` defaults to [`DEFAULT_SKIP_PATTERNS`].
pub fn expand_template_directory(
    template_dir: &Path,
    target_dir: &Path,
    variables: &HashMap<String, String>,
    skip_patterns: Option<&[String]>,
) -> Result<(), TemplateError> {
    if !template_dir.is_dir() {
        return Err(TemplateError::NotFound(template_dir.to_path_buf()));
    }

    let defaults: Vec<String> = DEFAULT_SKIP_PATTERNS.iter().map(|s| s.to_string()).collect();
    let patterns = skip_patterns.unwrap_or(&defaults);

    fs::create_dir_all(target_dir)?;
    expand_into(template_dir, target_dir, variables, patterns)
}

fn expand_into(
    source: &Path,
    target: &Path,
    variables: &HashMap<String, String>,
    patterns: &[String],
) -> Result<(), TemplateError> {
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if patterns.iter().any(|p| matches_pattern(&name, p)) {
            debug!(name, "skipping by pattern");
            continue;
        }

        let destination = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            fs::create_dir_all(&destination)?;
            expand_into(&entry.path(), &destination, variables, patterns)?;
        } else {
            let bytes = fs::read(entry.path())?;
            match std::str::from_utf8(&bytes) {
                Ok(text) => {
                    fs::write(&destination, expand_placeholders(text, variables))?;
                    fs::set_permissions(&destination, entry.metadata()?.permissions())?;
                }
                Err(_) => {
                    // Binary file: copy verbatim (fs::copy preserves mode).
                    fs::copy(entry.path(), &destination)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_expand_placeholders() {
        let variables = vars(&[("PROJECT_NAME", "demo"), ("SOURCE", "s3")]);

        assert_eq!(
            expand_placeholders("name: {{PROJECT_NAME}}", &variables),
            "name: demo"
        );
        assert_eq!(
            expand_placeholders("from {{ SOURCE }} and {{  SOURCE  }}", &variables),
            "from s3 and s3"
        );
    }

    #[test]
    fn test_unknown_placeholder_left_alone() {
        let variables = vars(&[("A", "x")]);
        assert_eq!(
            expand_placeholders("{{A}} {{UNKNOWN}}", &variables),
            "x {{UNKNOWN}}"
        );
    }

    #[test]
    fn test_replacement_value_with_dollar_sign() {
        let variables = vars(&[("PRICE", "$100")]);
        assert_eq!(expand_placeholders("cost: {{PRICE}}", &variables), "cost: $100");
    }

    #[test]
    fn test_expand_template_directory() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("template");
        let target = dir.path().join("target");
        fs::create_dir_all(template.join("task")).unwrap();
        fs::write(
            template.join("task").join("instruction.yaml"),
            "name: {{PROJECT_NAME}}-task\ndescription: For {{ PROJECT_NAME }}\n",
        )
        .unwrap();
        fs::write(template.join(".gitignore"), "ignored").unwrap();

        expand_template_directory(
            &template,
            &target,
            &vars(&[("PROJECT_NAME", "demo")]),
            None,
        )
        .unwrap();

        let content = fs::read_to_string(target.join("task").join("instruction.yaml")).unwrap();
        assert!(content.contains("name: demo-task"));
        assert!(content.contains("For demo"));
        assert!(!target.join(".gitignore").exists());
    }

    #[test]
    fn test_binary_files_copied_unchanged() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("template");
        let target = dir.path().join("target");
        fs::create_dir_all(&template).unwrap();
        let payload = [0u8, 159, 146, 150, 255];
        fs::write(template.join("blob.bin"), payload).unwrap();

        expand_template_directory(&template, &target, &HashMap::new(), None).unwrap();

        assert_eq!(fs::read(target.join("blob.bin")).unwrap(), payload);
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_preserved_for_text_files() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let template = dir.path().join("template");
        let target = dir.path().join("target");
        fs::create_dir_all(&template).unwrap();
        let script = template.join("run.sh");
        fs::write(&script, "#!/bin/bash\necho {{NAME}}\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        expand_template_directory(&template, &target, &vars(&[("NAME", "x")]), None).unwrap();

        let mode = fs::metadata(target.join("run.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[test]
    fn test_missing_template_dir() {
        let dir = tempdir().unwrap();
        let result = expand_template_directory(
            &dir.path().join("missing"),
            &dir.path().join("target"),
            &HashMap::new(),
            None,
        );
        assert!(matches!(result, Err(TemplateError::NotFound(_))));
    }

    #[test]
    fn test_custom_skip_patterns() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("template");
        let target = dir.path().join("target");
        fs::create_dir_all(&template).unwrap();
        fs::write(template.join("keep.txt"), "keep").unwrap();
        fs::write(template.join("drop.tmp"), "drop").unwrap();

        let patterns = vec!["*.tmp".to_string()];
        expand_template_directory(&template, &target, &HashMap::new(), Some(&patterns)).unwrap();

        assert!(target.join("keep.txt").exists());
        assert!(!target.join("drop.tmp").exists());
    }
}

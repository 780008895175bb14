//! ActionValidator (component E). Per-action schema plus the shared
//! selector/URL/text/upload/cookie rules from the design.

use super::types::Action;
use regex::Regex;
use std::path::{Component, Path};
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_files: usize,
    pub max_file_size: u64,
    pub allowed_extensions: Vec<String>,
    pub base_path: std::path::PathBuf,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_files: 10,
            max_file_size: 100 * 1024 * 1024,
            allowed_extensions: vec![
                "png".into(), "jpg".into(), "jpeg".into(), "pdf".into(),
                "txt".into(), "csv".into(), "json".into(),
            ],
            base_path: std::path::PathBuf::from("/tmp/uploads"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub allowed_url_schemes: Vec<String>,
    pub allowed_domains: Option<Vec<String>>,
    pub strict_selectors: bool,
    pub upload: UploadLimits,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            allowed_url_schemes: vec!["http".into(), "https".into()],
            allowed_domains: None,
            strict_selectors: false,
            upload: UploadLimits::default(),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn error(mut self, msg: impl Into<String>) -> Self {
        self.valid = false;
        self.errors.push(msg.into());
        self
    }
    fn warn(mut self, msg: impl Into<String>) -> Self {
        self.warnings.push(msg.into());
        self
    }
    fn ok() -> Self {
        Self { valid: true, errors: Vec::new(), warnings: Vec::new() }
    }
}

fn dangerous_selector_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)javascript:|vbscript:|data:|<script|on\w+=").expect("valid regex")
    })
}

fn sensitive_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)password|secret|token").expect("valid regex"))
}

pub struct ActionValidator {
    config: ValidatorConfig,
}

impl ActionValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self, action: &Action) -> ValidationReport {
        let mut report = ValidationReport::ok();
        match action {
            Action::Navigate { url, .. } => report = self.validate_url(report, url),
            Action::Click { selector, .. } => report = self.validate_selector(report, selector),
            Action::Type { selector, text, .. } => {
                report = self.validate_selector(report, selector);
                report = self.validate_type_text(report, selector, text);
            }
            Action::Select { selector, .. } => report = self.validate_selector(report, selector),
            Action::Keyboard { key, .. } => {
                if key.is_empty() {
                    report = report.error("key must not be empty");
                }
            }
            Action::Mouse { x, y, .. } | Action::Scroll { x, y, .. } => {
                if !x.is_finite() || !y.is_finite() {
                    report = report.error("x/y must be finite numbers");
                }
            }
            Action::Screenshot { .. } | Action::Pdf { .. } | Action::Content { .. } => {}
            Action::Wait { selector, .. } => report = self.validate_selector(report, selector),
            Action::Evaluate { script, .. } => {
                if script.trim().is_empty() {
                    report = report.error("script must not be empty");
                }
            }
            Action::Upload { selector, file_paths, .. } => {
                report = self.validate_selector(report, selector);
                report = self.validate_upload(report, file_paths);
            }
            Action::Cookie { set, .. } => {
                for cookie in set {
                    report = self.validate_cookie(report, cookie);
                }
            }
        }
        report
    }

    fn validate_selector(&self, mut report: ValidationReport, selector: &str) -> ValidationReport {
        if selector.is_empty() {
            return report.error("selector must not be empty");
        }
        if dangerous_selector_re().is_match(selector) {
            let msg = "selector contains a disallowed pattern (javascript:/data:/<script/onxxx=)";
            report = if self.config.strict_selectors {
                report.error(msg)
            } else {
                report.warn(msg)
            };
        }
        report
    }

    fn validate_url(&self, mut report: ValidationReport, url: &str) -> ValidationReport {
        let parsed = match url::Url::parse(url) {
            Ok(u) => u,
            Err(_) => return report.error("url does not parse"),
        };
        if !self.config.allowed_url_schemes.iter().any(|s| s == parsed.scheme()) {
            report = report.error(format!("scheme '{}' is not allowed", parsed.scheme()));
        }
        if let Some(allow) = &self.config.allowed_domains {
            let host = parsed.host_str().unwrap_or_default();
            if !allow.iter().any(|d| d == host) {
                report = report.error(format!("domain '{host}' is not on the allow list"));
            }
        }
        report
    }

    fn validate_type_text(&self, mut report: ValidationReport, selector: &str, text: &str) -> ValidationReport {
        if text.len() > 10_000 {
            report = report.warn("text exceeds 10000 characters");
        }
        if sensitive_field_re().is_match(selector) {
            report = report.warn("selector looks sensitive; payload will be redacted in logs");
        }
        report
    }

    fn validate_upload(&self, mut report: ValidationReport, paths: &[String]) -> ValidationReport {
        if paths.is_empty() {
            return report.error("at least one file path is required");
        }
        if paths.len() > self.config.upload.max_files {
            report = report.error(format!(
                "too many files: {} > max {}",
                paths.len(),
                self.config.upload.max_files
            ));
        }
        for raw in paths {
            let candidate = Path::new(raw);
            if candidate.components().any(|c| matches!(c, Component::ParentDir)) {
                report = report.error("File path outside allowed directory");
                continue;
            }
            let joined = self.config.upload.base_path.join(candidate);
            if !joined.starts_with(&self.config.upload.base_path) {
                report = report.error("File path outside allowed directory");
                continue;
            }
            let ext = candidate
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_lowercase();
            if !self.config.upload.allowed_extensions.iter().any(|a| *a == ext) {
                report = report.error(format!("extension '{ext}' is not on the allow list"));
            }
            match std::fs::metadata(&joined) {
                Ok(meta) if !meta.is_file() => {
                    report = report.error(format!("'{raw}' is not a regular file"));
                }
                Ok(meta) if meta.len() > self.config.upload.max_file_size => {
                    report = report.error(format!("'{raw}' exceeds max file size"));
                }
                Ok(_) => {}
                Err(_) => report = report.warn(format!("'{raw}' could not be statted (may not exist yet)")),
            }
        }
        report
    }

    fn validate_cookie(&self, mut report: ValidationReport, cookie: &crate::driver::CookieSpec) -> ValidationReport {
        if cookie.name.is_empty() {
            report = report.error("cookie name must not be empty");
        }
        if let Some(same_site) = &cookie.same_site {
            if !matches!(same_site.as_str(), "Strict" | "Lax" | "None") {
                report = report.error(format!("sameSite '{same_site}' must be Strict, Lax, or None"));
            }
            if same_site == "None" && !cookie.secure {
                report = report.warn("sameSite=None without secure is unsafe in most browsers");
            }
        }
        if let Some(expires) = cookie.expires {
            if expires < 0 {
                report = report.error("expires must be >= 0");
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::CookieSpec;
    use crate::pages::PageId;

    fn validator() -> ActionValidator {
        ActionValidator::new(ValidatorConfig::default())
    }

    #[test]
    fn rejects_unparseable_url() {
        let report = validator().validate(&Action::Navigate {
            page_id: PageId::new(),
            url: "not a url".into(),
            timeout: None,
        });
        assert!(!report.valid);
    }

    #[test]
    fn warns_on_javascript_selector_by_default() {
        let report = validator().validate(&Action::Click {
            page_id: PageId::new(),
            selector: "javascript:alert(1)".into(),
            timeout: None,
        });
        assert!(report.valid);
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn strict_mode_hard_fails_dangerous_selector() {
        let strict = ActionValidator::new(ValidatorConfig {
            strict_selectors: true,
            ..ValidatorConfig::default()
        });
        let report = strict.validate(&Action::Click {
            page_id: PageId::new(),
            selector: "<script>bad()</script>".into(),
            timeout: None,
        });
        assert!(!report.valid);
    }

    #[test]
    fn upload_blocks_path_traversal() {
        let report = validator().validate(&Action::Upload {
            page_id: PageId::new(),
            selector: "#file".into(),
            file_paths: vec!["../../etc/passwd".into()],
            timeout: None,
        });
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("outside allowed directory")));
    }

    #[test]
    fn cookie_none_without_secure_warns() {
        let cookie = CookieSpec {
            name: "a".into(),
            value: "b".into(),
            same_site: Some("None".into()),
            secure: false,
            ..Default::default()
        };
        let report = validator().validate(&Action::Cookie {
            page_id: PageId::new(),
            set: vec![cookie],
            get: false,
            timeout: None,
        });
        assert!(report.valid);
        assert!(!report.warnings.is_empty());
    }
}

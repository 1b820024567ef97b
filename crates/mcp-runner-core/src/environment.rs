use std::collections::HashMap;

/// Variables inherited from the runner by default
#[cfg(windows)]
pub const DEFAULT_INHERITED_ENV_VARS: &[&str] = &[
    "APPDATA",
    "HOMEDRIVE",
    "HOMEPATH",
    "LOCALAPPDATA",
    "PATH",
    "PROCESSOR_ARCHITECTURE",
    "SYSTEMDRIVE",
    "SYSTEMROOT",
    "TEMP",
    "USERNAME",
    "USERPROFILE",
];

/// Variables inherited from the runner by default
#[cfg(not(windows))]
pub const DEFAULT_INHERITED_ENV_VARS: &[&str] =
    &["HOME", "LOGNAME", "PATH", "SHELL", "TERM", "USER"];

/// The allow-listed subset of the runner's own environment.
///
/// Values starting with `()` are exported shell functions and never inherited.
pub fn default_environment() -> HashMap<String, String> {
    filter_environment(|key| std::env::var(key).ok())
}

fn filter_environment<F>(lookup: F) -> HashMap<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    DEFAULT_INHERITED_ENV_VARS
        .iter()
        .filter_map(|key| {
            let value = lookup(key)?;
            if value.starts_with("()") {
                return None;
            }
            Some((key.to_string(), value))
        })
        .collect()
}

/// Overlay `declared` on the default environment; declared values win.
pub fn merge_environment(declared: &HashMap<String, String>) -> HashMap<String, String> {
    overlay(default_environment(), declared)
}

fn overlay(
    mut base: HashMap<String, String>,
    declared: &HashMap<String, String>,
) -> HashMap<String, String> {
    base.extend(
        declared
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_keeps_only_allow_listed_keys() {
        let env = filter_environment(|key| Some(format!("value-of-{key}")));
        assert_eq!(env.len(), DEFAULT_INHERITED_ENV_VARS.len());
        assert_eq!(env.get("PATH").map(String::as_str), Some("value-of-PATH"));
    }

    #[test]
    fn test_filter_skips_missing_and_functions() {
        let env = filter_environment(|key| match key {
            "PATH" => Some("/usr/bin".to_string()),
            "TERM" | "TEMP" => Some("() { echo exported; }".to_string()),
            _ => None,
        });
        assert_eq!(env.len(), 1);
        assert_eq!(env.get("PATH").map(String::as_str), Some("/usr/bin"));
    }

    #[test]
    fn test_declared_values_win() {
        let base = HashMap::from([
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("HOME".to_string(), "/home/user".to_string()),
        ]);
        let declared = HashMap::from([
            ("PATH".to_string(), "/opt/bin".to_string()),
            ("API_KEY".to_string(), "secret".to_string()),
        ]);

        let merged = overlay(base, &declared);

        assert_eq!(merged.get("PATH").map(String::as_str), Some("/opt/bin"));
        assert_eq!(merged.get("HOME").map(String::as_str), Some("/home/user"));
        assert_eq!(merged.get("API_KEY").map(String::as_str), Some("secret"));
    }

    #[test]
    fn test_merge_never_leaks_unlisted_variables() {
        let merged = merge_environment(&HashMap::new());
        assert!(
            merged
                .keys()
                .all(|key| DEFAULT_INHERITED_ENV_VARS.contains(&key.as_str()))
        );
    }
}

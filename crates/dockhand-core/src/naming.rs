//! Identifier sanitization and deterministic schedule jitter.

/// Lowercases and maps every character outside `[a-z0-9]` to `_`,
/// trimming leading/trailing underscores. Idempotent.
pub fn sanitize_id(raw: &str) -> String {
    let mapped: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '_' })
        .collect();
    mapped.trim_matches('_').to_string()
}

/// Slash-joined `project/service` identity used for restic path scoping.
///
/// Falls back to `fallback` when the service name is empty; the project
/// segment is only added when `include_project` is set and both sides
/// sanitize to something non-empty.
pub fn service_path_name(project: &str, service: &str, fallback: &str, include_project: bool) -> String {
    let mut name = service;
    if name.is_empty() {
        name = fallback;
    }
    let name = sanitize_id(name);
    if include_project {
        let project = sanitize_id(project);
        if !project.is_empty() && !name.is_empty() {
            return format!("{project}/{name}");
        }
    }
    name
}

/// Deterministic per-plan minute for the `T` schedule placeholder.
///
/// FNV-1a over the plan id, reduced mod 60. Same id always resolves to
/// the same minute, across runs and hosts.
pub fn random_minute_for_plan(plan_id: &str) -> u32 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = FNV_OFFSET;
    for byte in plan_id.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    (hash % 60) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_lowercases_and_replaces() {
        assert_eq!(sanitize_id("My-App.Web_1"), "my_app_web_1");
        assert_eq!(sanitize_id("__edge__"), "edge");
        assert_eq!(sanitize_id(""), "");
        assert_eq!(sanitize_id("---"), "");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for raw in ["My-App", "a.b.c", "UPPER", "1-2-3", "_x_"] {
            let once = sanitize_id(raw);
            assert_eq!(sanitize_id(&once), once);
            assert!(once.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
            assert!(!once.starts_with('_') && !once.ends_with('_'));
        }
    }

    #[test]
    fn service_path_name_prefers_service_then_fallback() {
        assert_eq!(service_path_name("demo", "api", "demo-api-1", true), "demo/api");
        assert_eq!(service_path_name("demo", "api", "demo-api-1", false), "api");
        assert_eq!(service_path_name("", "", "demo-api-1", true), "demo_api_1");
    }

    #[test]
    fn random_minute_is_stable_and_in_range() {
        let a = random_minute_for_plan("demo_api");
        assert_eq!(a, random_minute_for_plan("demo_api"));
        assert!(a < 60);
        // different ids usually land on different minutes
        assert_ne!(
            random_minute_for_plan("alpha"),
            random_minute_for_plan("omega")
        );
    }
}

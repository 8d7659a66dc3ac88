//! Wildcard container selection.

use std::ops::Deref;

use k8s_openapi::api::core::v1::Container;

use crate::ALL_CONTAINERS;

/// Returns true if `name` matches `pattern`, where `pattern` may contain
/// non-greedy `*` wildcards.
///
/// Parts between wildcards are located left to right without backtracking,
/// so a pattern whose earlier part occurs several times in `name` may be
/// rejected even though some alignment would match.
pub fn select_string(name: &str, pattern: &str) -> bool {
	if pattern == ALL_CONTAINERS {
		return true;
	}
	if !pattern.contains('*') {
		return name == pattern;
	}

	let last = pattern.matches('*').count();
	let mut pos = 0;
	for (i, part) in pattern.split('*').enumerate() {
		if part.is_empty() {
			continue;
		}
		let Some(offset) = name[pos..].find(part) else {
			return false;
		};
		let found = pos + offset;
		// first part must anchor at the start
		if i == 0 && found != 0 {
			return false;
		}
		// last part must anchor at the end
		if i == last && found + part.len() != name.len() {
			return false;
		}
		pos = found;
	}
	true
}

/// Split containers into those whose name matches `pattern` and the rest,
/// preserving order.
///
/// Works with both shared and mutable references, so callers can go on to
/// modify the matched half.
pub fn select_containers<C, I>(containers: I, pattern: &str) -> (Vec<C>, Vec<C>)
where
	I: IntoIterator<Item = C>,
	C: Deref<Target = Container>,
{
	containers
		.into_iter()
		.partition(|container| select_string(&container.name, pattern))
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	fn container(name: &str) -> Container {
		Container {
			name: name.to_string(),
			..Container::default()
		}
	}

	fn names(containers: &[&Container]) -> Vec<String> {
		containers.iter().map(|c| c.name.clone()).collect()
	}

	#[rstest]
	#[case("nginx", "nginx", true)]
	#[case("nginx", "nginx2", false)]
	#[case("", "", true)]
	#[case("sidecar", "side", false)]
	fn test_exact_pattern(#[case] name: &str, #[case] pattern: &str, #[case] expected: bool) {
		assert_eq!(select_string(name, pattern), expected);
		assert_eq!(select_string(name, pattern), name == pattern);
	}

	#[rstest]
	#[case("")]
	#[case("app")]
	#[case("istio-proxy")]
	fn test_match_all(#[case] name: &str) {
		assert!(select_string(name, "*"));
	}

	#[rstest]
	#[case("foobar", true)]
	#[case("foo-bar", true)]
	#[case("barfoo", false)]
	#[case("foo", false)]
	#[case("foo-baz", false)]
	fn test_compound_pattern(#[case] name: &str, #[case] expected: bool) {
		assert_eq!(select_string(name, "foo*bar"), expected);
	}

	#[rstest]
	#[case("app-sidecar", "*-sidecar", true)]
	#[case("app-sidecar-x", "*-sidecar", false)]
	#[case("app-sidecar", "app-*", true)]
	#[case("my-app", "app-*", false)]
	#[case("init-db-migrate", "init*db*", true)]
	#[case("app", "**app**", true)]
	#[case("xyz", "*app*", false)]
	fn test_edge_wildcards(#[case] name: &str, #[case] pattern: &str, #[case] expected: bool) {
		assert_eq!(select_string(name, pattern), expected);
	}

	#[test]
	fn test_select_all_containers() {
		let containers = vec![container("a"), container("b"), container("c")];

		let (matched, unmatched) = select_containers(&containers, "*");

		assert_eq!(names(&matched), vec!["a", "b", "c"]);
		assert!(unmatched.is_empty());
	}

	#[test]
	fn test_select_preserves_order() {
		let containers = vec![
			container("web"),
			container("log-shipper"),
			container("web-exporter"),
		];

		let (matched, unmatched) = select_containers(&containers, "web*");

		assert_eq!(names(&matched), vec!["web", "web-exporter"]);
		assert_eq!(names(&unmatched), vec!["log-shipper"]);
	}

	#[test]
	fn test_select_mutable_matches() {
		let mut containers = vec![container("bar"), container("baz")];

		let (matched, unmatched) = select_containers(containers.iter_mut(), "bar");
		assert_eq!(matched.len(), 1);
		assert_eq!(unmatched.len(), 1);
		for c in matched {
			c.image = Some("busybox".to_string());
		}

		assert_eq!(containers[0].image.as_deref(), Some("busybox"));
		assert_eq!(containers[1].image, None);
	}
}

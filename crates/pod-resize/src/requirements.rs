//! Parsing of `--limits`/`--requests` flag values.

use std::collections::BTreeMap;

use k8s_openapi::{
	api::core::v1::ResourceRequirements, apimachinery::pkg::api::resource::Quantity,
};
use thiserror::Error;

use crate::quantity::parse_quantity;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequirementsError {
	#[error("invalid argument syntax {0}, expected <resource>=<value>")]
	InvalidSyntax(String),

	#[error("invalid quantity {value:?} for resource {resource}")]
	InvalidQuantity { resource: String, value: String },
}

/// Parse the limits and requests flag strings into requirements.
///
/// An empty string leaves the corresponding side unset.
pub fn parse_requirements(
	limits: &str,
	requests: &str,
) -> Result<ResourceRequirements, RequirementsError> {
	Ok(ResourceRequirements {
		limits: parse_resource_list(limits)?,
		requests: parse_resource_list(requests)?,
		..ResourceRequirements::default()
	})
}

/// Parse a `cpu=100m,memory=256Mi` style list.
///
/// Values are stored in canonical form, e.g. `cpu=0.2` becomes `200m`.
pub fn parse_resource_list(
	spec: &str,
) -> Result<Option<BTreeMap<String, Quantity>>, RequirementsError> {
	if spec.is_empty() {
		return Ok(None);
	}

	let mut list = BTreeMap::new();
	for statement in spec.split(',') {
		let mut parts = statement.split('=');
		let (Some(resource), Some(value), None) = (parts.next(), parts.next(), parts.next())
		else {
			return Err(RequirementsError::InvalidSyntax(statement.to_string()));
		};
		if resource.is_empty() {
			return Err(RequirementsError::InvalidSyntax(statement.to_string()));
		}
		let Some(quantity) = parse_quantity(value) else {
			return Err(RequirementsError::InvalidQuantity {
				resource: resource.to_string(),
				value: value.to_string(),
			});
		};
		list.insert(resource.to_string(), quantity);
	}
	Ok(Some(list))
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use rstest::rstest;

	use super::*;

	#[test]
	fn test_parse_both_sides() {
		let requirements = parse_requirements("cpu=500m,memory=2Gi", "cpu=200m").unwrap();

		assert_eq!(
			requirements.limits,
			Some(BTreeMap::from([
				("cpu".to_string(), Quantity("500m".to_string())),
				("memory".to_string(), Quantity("2Gi".to_string())),
			]))
		);
		assert_eq!(
			requirements.requests,
			Some(BTreeMap::from([(
				"cpu".to_string(),
				Quantity("200m".to_string())
			)]))
		);
	}

	#[test]
	fn test_empty_side_stays_unset() {
		let requirements = parse_requirements("", "memory=1Gi").unwrap();

		assert_eq!(requirements.limits, None);
		assert!(requirements.requests.is_some());
	}

	#[rstest]
	#[case("cpu")]
	#[case("cpu=1=2")]
	#[case("=1")]
	#[case("cpu=1,")]
	fn test_invalid_syntax(#[case] spec: &str) {
		assert_matches!(
			parse_resource_list(spec),
			Err(RequirementsError::InvalidSyntax(_))
		);
	}

	#[rstest]
	#[case("cpu=abc")]
	#[case("cpu=")]
	#[case("memory=1GB")]
	#[case("cpu=1.2.3")]
	fn test_invalid_quantity(#[case] spec: &str) {
		assert_matches!(
			parse_resource_list(spec),
			Err(RequirementsError::InvalidQuantity { resource, .. }) if spec.starts_with(&resource)
		);
	}

	#[rstest]
	#[case("1", "1")]
	#[case("0.5", "500m")]
	#[case(".5", "500m")]
	#[case("100m", "100m")]
	#[case("256Mi", "256Mi")]
	#[case("1e3", "1e3")]
	#[case("2G", "2G")]
	#[case("+1Ki", "1Ki")]
	fn test_valid_quantities_canonicalized(#[case] value: &str, #[case] stored: &str) {
		let list = parse_resource_list(&format!("cpu={value}"))
			.unwrap()
			.unwrap();
		assert_eq!(list["cpu"], Quantity(stored.to_string()));
	}
}

//! Kubernetes resource quantities.
//!
//! Requested values are rewritten in the canonical form the API server uses
//! when it serializes a pod, so `0.2` and `200m` or `1024Mi` and `1Gi` encode
//! to the same bytes and do not produce a patch.

use std::sync::LazyLock;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use regex::{Captures, Regex};

/// Signed decimal number followed by an optional binary SI, decimal SI or
/// decimal exponent suffix.
static QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(concat!(
		r"^(?P<sign>[+-])?",
		r"(?:(?P<int>[0-9]+)(?:\.(?P<frac>[0-9]*))?|\.(?P<bare>[0-9]+))",
		r"(?P<suffix>[KMGTPE]i|[numkMGTPE]|[eE][+-]?[0-9]+)?$",
	))
	.expect("quantity regex is valid")
});

const BINARY_SUFFIXES: [&str; 7] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];

const DECIMAL_SUFFIXES: [(&str, i32); 10] = [
	("n", -9),
	("u", -6),
	("m", -3),
	("", 0),
	("k", 3),
	("M", 6),
	("G", 9),
	("T", 12),
	("P", 15),
	("E", 18),
];

/// Finest precision kept. Smaller fractions round away from zero.
const MIN_EXPONENT: i32 = -9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
	BinarySI,
	DecimalSI,
	DecimalExponent,
}

/// `mantissa * 10^exponent`, plus the notation it was written in.
#[derive(Debug)]
struct Decimal {
	negative: bool,
	mantissa: u128,
	exponent: i32,
	format: Format,
}

/// Parse a quantity and return it in canonical form.
///
/// Returns `None` when `value` is not a quantity. Values too large to
/// canonicalize are kept as written.
pub fn parse_quantity(value: &str) -> Option<Quantity> {
	let captures = QUANTITY.captures(value)?;
	let canonical = Decimal::from_captures(&captures)
		.and_then(Decimal::canonical)
		.unwrap_or_else(|| value.to_string());
	Some(Quantity(canonical))
}

fn group<'t>(captures: &Captures<'t>, name: &str) -> &'t str {
	captures.name(name).map_or("", |m| m.as_str())
}

impl Decimal {
	fn from_captures(captures: &Captures<'_>) -> Option<Self> {
		let int = group(captures, "int");
		let frac = captures
			.name("frac")
			.or_else(|| captures.name("bare"))
			.map_or("", |m| m.as_str());
		let suffix = group(captures, "suffix");

		let mut mantissa: u128 = format!("{int}{frac}").parse().ok()?;
		let mut exponent = -i32::try_from(frac.len()).ok()?;

		let decimal = DECIMAL_SUFFIXES.iter().find(|(s, _)| *s == suffix);
		let format = if let Some(&(_, shift)) = decimal {
			exponent += shift;
			Format::DecimalSI
		} else if let Some(power) = BINARY_SUFFIXES.iter().position(|s| *s == suffix) {
			mantissa = mantissa.checked_mul(1024u128.checked_pow(u32::try_from(power).ok()?)?)?;
			Format::BinarySI
		} else {
			exponent = exponent.checked_add(suffix.get(1..)?.parse().ok()?)?;
			Format::DecimalExponent
		};

		Some(Self {
			negative: group(captures, "sign") == "-",
			mantissa,
			exponent,
			format,
		})
	}

	fn canonical(mut self) -> Option<String> {
		if self.exponent < MIN_EXPONENT {
			let scale = u32::try_from(MIN_EXPONENT - self.exponent).ok()?;
			self.mantissa = self.mantissa.div_ceil(10u128.checked_pow(scale)?);
			self.exponent = MIN_EXPONENT;
		}
		if self.mantissa == 0 {
			return Some("0".to_string());
		}
		while self.mantissa % 10 == 0 {
			self.mantissa /= 10;
			self.exponent += 1;
		}
		let sign = if self.negative { "-" } else { "" };

		// Whole byte counts of at least 1Ki keep binary notation
		if self.format == Format::BinarySI && self.exponent >= 0 {
			let mut value = scaled(self.mantissa, self.exponent)?;
			if value >= 1024 {
				let mut power = 0;
				while power + 1 < BINARY_SUFFIXES.len() && value % 1024 == 0 {
					value /= 1024;
					power += 1;
				}
				return Some(format!("{sign}{value}{}", BINARY_SUFFIXES[power]));
			}
		}

		let mut shift = self.exponent.div_euclid(3) * 3;
		let suffix = if self.format == Format::DecimalExponent {
			if shift == 0 {
				String::new()
			} else {
				format!("e{shift}")
			}
		} else {
			shift = shift.min(18);
			let (suffix, _) = DECIMAL_SUFFIXES.iter().find(|(_, s)| *s == shift)?;
			(*suffix).to_string()
		};
		let value = scaled(self.mantissa, self.exponent - shift)?;
		Some(format!("{sign}{value}{suffix}"))
	}
}

fn scaled(mantissa: u128, exponent: i32) -> Option<u128> {
	mantissa.checked_mul(10u128.checked_pow(u32::try_from(exponent).ok()?)?)
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[rstest]
	#[case("1", "1")]
	#[case("0", "0")]
	#[case("-0", "0")]
	#[case("0.2", "200m")]
	#[case(".5", "500m")]
	#[case("1.5", "1500m")]
	#[case("1000m", "1")]
	#[case("100m", "100m")]
	#[case("1500", "1500")]
	#[case("2000", "2k")]
	#[case("2G", "2G")]
	#[case("1E", "1E")]
	#[case("0.0000000001", "1n")]
	#[case("+1Ki", "1Ki")]
	#[case("1024Mi", "1Gi")]
	#[case("1536Mi", "1536Mi")]
	#[case("1.5Gi", "1536Mi")]
	#[case("0.5Ki", "512")]
	#[case("1000Ki", "1000Ki")]
	#[case("1e3", "1e3")]
	#[case("1000e-3", "1")]
	#[case("-250m", "-250m")]
	fn test_canonical_form(#[case] value: &str, #[case] canonical: &str) {
		assert_eq!(parse_quantity(value), Some(Quantity(canonical.to_string())));
	}

	#[rstest]
	#[case("")]
	#[case("abc")]
	#[case("1GB")]
	#[case("1.2.3")]
	#[case(".")]
	#[case("1e")]
	fn test_not_a_quantity(#[case] value: &str) {
		assert_eq!(parse_quantity(value), None);
	}

	#[test]
	fn test_oversized_value_kept_as_written() {
		let value = "123456789012345678901234567890123456789012345";
		assert_eq!(parse_quantity(value), Some(Quantity(value.to_string())));
	}
}

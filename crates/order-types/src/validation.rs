//! Configuration validation for backend implementation tables.
//!
//! Each storage or queue backend receives its own raw TOML table from the
//! configuration file. Backends describe the fields they accept with a
//! [`Schema`] and validate the table before they are constructed.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	/// A required field is missing.
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// A field has an invalid value.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	/// A field has the wrong type.
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

/// Expected type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// An integer with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	/// A nested table with its own schema.
	Table(Schema),
}

impl FieldType {
	fn name(&self) -> &'static str {
		match self {
			FieldType::String => "string",
			FieldType::Integer { .. } => "integer",
			FieldType::Boolean => "boolean",
			FieldType::Table(_) => "table",
		}
	}
}

/// Custom check run after the type check succeeds.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field in a [`Schema`].
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Adds a custom validator to this field.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, path: &str, value: &toml::Value) -> Result<(), ValidationError> {
		check_type(path, value, &self.field_type)?;
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: path.to_string(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Required and optional fields of a configuration table.
#[derive(Debug, Default)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML value against this schema.
	///
	/// Fields not named by the schema are ignored.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		self.validate_at("", config)
	}

	fn validate_at(&self, prefix: &str, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: if prefix.is_empty() { "root".to_string() } else { prefix.to_string() },
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

		let path = |name: &str| {
			if prefix.is_empty() {
				name.to_string()
			} else {
				format!("{}.{}", prefix, name)
			}
		};

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(path(&field.name)))?;
			field.check(&path(&field.name), value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(&path(&field.name), value)?;
			}
		}

		Ok(())
	}
}

fn check_type(path: &str, value: &toml::Value, expected: &FieldType) -> Result<(), ValidationError> {
	let mismatch = || ValidationError::TypeMismatch {
		field: path.to_string(),
		expected: expected.name().to_string(),
		actual: value.type_str().to_string(),
	};

	match expected {
		FieldType::String if !value.is_str() => Err(mismatch()),
		FieldType::Boolean if !value.is_bool() => Err(mismatch()),
		FieldType::Integer { min, max } => {
			let int_val = value.as_integer().ok_or_else(mismatch)?;
			if let Some(min_val) = min {
				if int_val < *min_val {
					return Err(ValidationError::InvalidValue {
						field: path.to_string(),
						message: format!("Value {} is less than minimum {}", int_val, min_val),
					});
				}
			}
			if let Some(max_val) = max {
				if int_val > *max_val {
					return Err(ValidationError::InvalidValue {
						field: path.to_string(),
						message: format!("Value {} is greater than maximum {}", int_val, max_val),
					});
				}
			}
			Ok(())
		},
		FieldType::Table(schema) => schema.validate_at(path, value),
		_ => Ok(()),
	}
}

/// A configuration schema that can validate a backend's TOML table.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn amqp_like_schema() -> Schema {
		Schema::new(
			vec![Field::new("url", FieldType::String).with_validator(|v| {
				match v.as_str() {
					Some(url) if url.starts_with("amqp") => Ok(()),
					_ => Err("must be an amqp:// url".to_string()),
				}
			})],
			vec![
				Field::new(
					"prefetch_count",
					FieldType::Integer {
						min: Some(1),
						max: Some(65535),
					},
				),
				Field::new(
					"tls",
					FieldType::Table(Schema::new(vec![Field::new("enabled", FieldType::Boolean)], vec![])),
				),
			],
		)
	}

	#[test]
	fn test_valid_table() {
		let config: toml::Value = toml::from_str(
			r#"
url = "amqp://localhost"
prefetch_count = 10
[tls]
enabled = false
"#,
		)
		.unwrap();
		assert!(amqp_like_schema().validate(&config).is_ok());
	}

	#[test]
	fn test_missing_required_field() {
		let config: toml::Value = toml::from_str("prefetch_count = 10").unwrap();
		let err = amqp_like_schema().validate(&config).unwrap_err();
		assert!(matches!(err, ValidationError::MissingField(ref f) if f == "url"));
	}

	#[test]
	fn test_custom_validator_and_bounds() {
		let config: toml::Value = toml::from_str(r#"url = "http://localhost""#).unwrap();
		assert!(matches!(
			amqp_like_schema().validate(&config),
			Err(ValidationError::InvalidValue { .. })
		));

		let config: toml::Value =
			toml::from_str("url = \"amqp://localhost\"\nprefetch_count = 0").unwrap();
		assert!(matches!(
			amqp_like_schema().validate(&config),
			Err(ValidationError::InvalidValue { ref field, .. }) if field == "prefetch_count"
		));
	}

	#[test]
	fn test_nested_field_path() {
		let config: toml::Value =
			toml::from_str("url = \"amqp://localhost\"\n[tls]\nenabled = \"yes\"").unwrap();
		let err = amqp_like_schema().validate(&config).unwrap_err();
		assert!(matches!(err, ValidationError::TypeMismatch { ref field, .. } if field == "tls.enabled"));
	}
}

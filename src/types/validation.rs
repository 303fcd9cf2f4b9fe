//! Field-level validation errors shared by clients and appointments

use serde::{Deserialize, Serialize};

/// Field name used for errors that belong to the record as a whole
pub const BASE: &str = "base";

/// A single failed rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Ordered collection of failed rules, in the order the rules ran
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn on(&self, field: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|e| e.field == field)
            .map(|e| e.message.as_str())
            .collect()
    }

    /// Human-readable messages, e.g. `"CPF já está cadastrado"`
    pub fn full_messages(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|e| {
                if e.field == BASE {
                    e.message.clone()
                } else {
                    format!("{} {}", field_label(&e.field), e.message)
                }
            })
            .collect()
    }

    pub fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_messages().join(", "))
    }
}

fn field_label(field: &str) -> &str {
    match field {
        "name" => "Nome",
        "address" => "Endereço",
        "city" => "Cidade",
        "state" => "Estado",
        "cep" => "CEP",
        "phone" => "Telefone",
        "cpf" => "CPF",
        "start_time" => "Início",
        "end_time" => "Término",
        other => other,
    }
}

/// Presence + character-length rule, the way both entities check their names
pub(crate) fn check_length(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&str>,
    min: usize,
    max: usize,
) -> bool {
    let value = match value.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => {
            errors.add(field, "não pode ficar em branco");
            return false;
        }
    };

    let len = value.chars().count();
    if len < min {
        errors.add(field, format!("é muito curto (mínimo: {} caracteres)", min));
        false
    } else if len > max {
        errors.add(field, format!("é muito longo (máximo: {} caracteres)", max));
        false
    } else {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_messages_use_labels() {
        let mut errors = ValidationErrors::default();
        errors.add("cpf", "já está cadastrado");
        errors.add(BASE, "Conflito de horário");

        assert_eq!(
            errors.full_messages(),
            vec!["CPF já está cadastrado".to_string(), "Conflito de horário".to_string()]
        );
    }

    #[test]
    fn test_check_length_reports_blank() {
        let mut errors = ValidationErrors::default();
        assert!(!check_length(&mut errors, "name", Some("   "), 2, 100));
        assert_eq!(errors.on("name"), vec!["não pode ficar em branco"]);
    }

    #[test]
    fn test_check_length_counts_characters_not_bytes() {
        let mut errors = ValidationErrors::default();
        assert!(check_length(&mut errors, "name", Some("Zé"), 2, 100));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_check_length_bounds() {
        let mut errors = ValidationErrors::default();
        check_length(&mut errors, "name", Some("A"), 2, 100);
        check_length(&mut errors, "city", Some(&"x".repeat(101)), 2, 100);
        assert_eq!(errors.on("name"), vec!["é muito curto (mínimo: 2 caracteres)"]);
        assert_eq!(errors.on("city"), vec!["é muito longo (máximo: 100 caracteres)"]);
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let mut errors = ValidationErrors::default();
        errors.add("state", "não é um estado válido");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json[0]["field"], "state");
    }
}

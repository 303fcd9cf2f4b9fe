//! Client types: entity, write-time normalisation and model rules

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::messages::default_limit;
use super::validation::{check_length, ValidationErrors};

/// Brazilian federative units accepted in `state`
pub const VALID_STATES: [&str; 27] = [
    "AC", "AL", "AP", "AM", "BA", "CE", "DF", "ES", "GO", "MA", "MT", "MS", "MG", "PA", "PB",
    "PR", "PE", "PI", "RJ", "RN", "RS", "RO", "RR", "SC", "SP", "SE", "TO",
];

static CEP_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{5}-?\d{3}$").expect("static CEP pattern"));
static PHONE_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(\d{2}\)\s\d{4,5}-\d{4}$").expect("static phone pattern"));

/// Client entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub cep: String,
    pub phone: String,
    pub cpf: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw client attributes as submitted by a form or produced by the CSV mapper.
/// Every field is optional; `None` means "not provided".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAttributes {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub cep: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub cpf: Option<String>,
}

/// Attributes that passed every rule; ready to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClient {
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub cep: String,
    pub phone: String,
    pub cpf: String,
}

/// Request to update a client; only provided attributes change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateClientRequest {
    pub id: Uuid,
    #[serde(flatten)]
    pub attributes: ClientAttributes,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

pub fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

impl ClientAttributes {
    /// Write-time normalisation: digits-only CPF, dashed 8-digit CEP,
    /// punctuated phone, uppercase state and name.
    pub fn normalized(&self) -> ClientAttributes {
        let mut out = self.clone();

        if let Some(cpf) = present(&self.cpf) {
            out.cpf = Some(digits_only(cpf));
        }

        if let Some(cep) = present(&self.cep) {
            let digits = digits_only(cep);
            if digits.len() == 8 {
                out.cep = Some(format!("{}-{}", &digits[..5], &digits[5..]));
            }
        }

        if let Some(phone) = present(&self.phone) {
            if let Some(formatted) = format_phone(phone) {
                out.phone = Some(formatted);
            }
        }

        if let Some(state) = present(&self.state) {
            out.state = Some(state.to_uppercase());
        }

        if let Some(name) = present(&self.name) {
            out.name = Some(name.to_uppercase());
        }

        out
    }

    /// Fill attributes that were not provided from an existing record
    pub fn merged_over(&self, existing: &Client) -> ClientAttributes {
        ClientAttributes {
            name: self.name.clone().or_else(|| Some(existing.name.clone())),
            address: self.address.clone().or_else(|| Some(existing.address.clone())),
            city: self.city.clone().or_else(|| Some(existing.city.clone())),
            state: self.state.clone().or_else(|| Some(existing.state.clone())),
            cep: self.cep.clone().or_else(|| Some(existing.cep.clone())),
            phone: self.phone.clone().or_else(|| Some(existing.phone.clone())),
            cpf: self.cpf.clone().or_else(|| Some(existing.cpf.clone())),
        }
    }

    /// Run the model rules on already-normalised attributes.
    ///
    /// `cpf_taken` is the outcome of the per-owner uniqueness lookup, which
    /// needs the store and is therefore done by the caller.
    pub fn validate(&self, cpf_taken: bool) -> Result<NewClient, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        check_length(&mut errors, "name", self.name.as_deref(), 2, 100);
        check_length(&mut errors, "address", self.address.as_deref(), 5, 200);
        check_length(&mut errors, "city", self.city.as_deref(), 2, 100);

        match present(&self.state) {
            None => errors.add("state", "não pode ficar em branco"),
            Some(state) => {
                if state.chars().count() != 2 {
                    errors.add("state", "não possui o tamanho esperado (2 caracteres)");
                }
                if !VALID_STATES.contains(&state) {
                    errors.add("state", "não é um estado válido");
                }
            }
        }

        match present(&self.cep) {
            None => errors.add("cep", "não pode ficar em branco"),
            Some(cep) if !CEP_FORMAT.is_match(cep) => errors.add("cep", "deve ter formato 12345-678"),
            Some(_) => {}
        }

        if present(&self.phone).is_none() {
            errors.add("phone", "não pode ficar em branco");
        }

        match present(&self.cpf) {
            None => errors.add("cpf", "não pode ficar em branco"),
            Some(cpf) => {
                if cpf_taken {
                    errors.add("cpf", "já está cadastrado");
                }
                if !cpf_is_valid(cpf) {
                    errors.add("cpf", "não é válido");
                }
            }
        }

        if let Some(phone) = present(&self.phone) {
            if !PHONE_FORMAT.is_match(phone) {
                errors.add("phone", "deve ter formato (11) 99999-9999");
            }
        }

        errors.into_result(NewClient {
            name: self.name.clone().unwrap_or_default(),
            address: self.address.clone().unwrap_or_default(),
            city: self.city.clone().unwrap_or_default(),
            state: self.state.clone().unwrap_or_default(),
            cep: self.cep.clone().unwrap_or_default(),
            phone: self.phone.clone().unwrap_or_default(),
            cpf: self.cpf.clone().unwrap_or_default(),
        })
    }
}

/// `(DD) DDDDD-DDDD` for mobiles, `(DD) DDDD-DDDD` for landlines
fn format_phone(phone: &str) -> Option<String> {
    let d = digits_only(phone);
    match d.len() {
        11 => Some(format!("({}) {}-{}", &d[..2], &d[2..7], &d[7..])),
        10 => Some(format!("({}) {}-{}", &d[..2], &d[2..6], &d[6..])),
        _ => None,
    }
}

/// CPF check-digit verification (mod 11). Rejects repeated-digit sequences.
pub fn cpf_is_valid(cpf: &str) -> bool {
    let digits: Vec<u32> = cpf.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 11 || cpf.chars().any(|c| !c.is_ascii_digit()) {
        return false;
    }
    if digits.iter().all(|&d| d == digits[0]) {
        return false;
    }

    let check = |len: usize| -> u32 {
        let weight_start = len as u32 + 1;
        let sum: u32 = digits[..len]
            .iter()
            .enumerate()
            .map(|(i, d)| d * (weight_start - i as u32))
            .sum();
        let rem = sum % 11;
        if rem < 2 { 0 } else { 11 - rem }
    };

    check(9) == digits[9] && check(10) == digits[10]
}

// ============================================================================
// Listing
// ============================================================================

/// Which column a search term targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientSearchType {
    Name,
    Cpf,
    Phone,
    #[default]
    #[serde(other)]
    General,
}

/// Sort options for the client list; defaults to name ascending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientSort {
    #[default]
    NameAsc,
    NameDesc,
    StateAsc,
    StateDesc,
    CreatedAtAsc,
    CreatedAtDesc,
}

impl ClientSort {
    pub fn order_by(&self) -> &'static str {
        match self {
            Self::NameAsc => "name ASC",
            Self::NameDesc => "name DESC",
            Self::StateAsc => "state ASC",
            Self::StateDesc => "state DESC",
            Self::CreatedAtAsc => "created_at ASC",
            Self::CreatedAtDesc => "created_at DESC",
        }
    }
}

/// Request for listing clients with search, sort and pagination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListClientsRequest {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub search_type: ClientSearchType,
    #[serde(default)]
    pub sort: ClientSort,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl Default for ListClientsRequest {
    fn default() -> Self {
        Self {
            search: None,
            search_type: ClientSearchType::General,
            sort: ClientSort::NameAsc,
            limit: default_limit(),
            offset: 0,
        }
    }
}

/// Substrings to look for per column; a client matches when any of them hits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSearch {
    pub name: Option<String>,
    pub cpf: Option<String>,
    pub phone: Option<String>,
}

impl ClientSearch {
    pub fn matches(&self, client: &Client) -> bool {
        let contains = |haystack: &str, needle: &Option<String>| {
            needle
                .as_ref()
                .is_some_and(|n| haystack.to_lowercase().contains(&n.to_lowercase()))
        };
        contains(&client.name, &self.name)
            || contains(&client.cpf, &self.cpf)
            || contains(&client.phone, &self.phone)
    }
}

impl ListClientsRequest {
    /// Trimmed, non-empty search term
    pub fn term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// CPF is stored as digits, so CPF lookups use the term's digits only.
    /// A general search skips the CPF column when the term has no digits.
    pub fn search_columns(&self) -> Option<ClientSearch> {
        let term = self.term()?;
        let digits = digits_only(term);

        let search = match self.search_type {
            ClientSearchType::Name => ClientSearch {
                name: Some(term.to_string()),
                ..Default::default()
            },
            ClientSearchType::Cpf => ClientSearch {
                cpf: Some(digits),
                ..Default::default()
            },
            ClientSearchType::Phone => ClientSearch {
                phone: Some(term.to_string()),
                ..Default::default()
            },
            ClientSearchType::General => ClientSearch {
                name: Some(term.to_string()),
                cpf: (!digits.is_empty()).then_some(digits),
                phone: Some(term.to_string()),
            },
        };
        Some(search)
    }
}

// ============================================================================
// Presentation
// ============================================================================

/// Client plus display helpers
#[derive(Debug, Clone, Serialize)]
pub struct ClientDetail {
    #[serde(flatten)]
    pub client: Client,
    pub formatted_cpf: String,
    pub full_address: String,
    pub maps_url: String,
    pub phone_link: String,
    pub whatsapp_link: String,
}

impl From<Client> for ClientDetail {
    fn from(client: Client) -> Self {
        let formatted_cpf = if client.cpf.len() == 11 {
            format!(
                "{}.{}.{}-{}",
                &client.cpf[..3],
                &client.cpf[3..6],
                &client.cpf[6..9],
                &client.cpf[9..]
            )
        } else {
            client.cpf.clone()
        };
        let full_address = format!(
            "{}, {}, {}, {}",
            client.address, client.city, client.state, client.cep
        );
        let maps_url = format!("https://maps.google.com/?q={}", full_address.replace(' ', "+"));
        let phone_digits = digits_only(&client.phone);

        Self {
            formatted_cpf,
            full_address,
            maps_url,
            phone_link: format!("tel:{}", phone_digits),
            whatsapp_link: format!("https://wa.me/{}", phone_digits),
            client,
        }
    }
}

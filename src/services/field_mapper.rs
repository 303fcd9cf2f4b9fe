//! CSV row → client attributes
//!
//! Columns are recognised by keywords in their header (case and accent
//! insensitive). Values are cleaned per field; anything that cannot be
//! cleaned is left out and caught later by the client rules.

use crate::types::client::{digits_only, ClientAttributes};

/// Client attribute a CSV column feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientField {
    Name,
    Cpf,
    Phone,
    Address,
    City,
    State,
    Cep,
}

/// Header keywords in priority order; the first table entry whose keyword
/// occurs in the folded header wins.
const HEADER_KEYWORDS: &[(&[&str], ClientField)] = &[
    (&["nome", "name"], ClientField::Name),
    (&["cpf"], ClientField::Cpf),
    (&["telefone", "phone", "fone"], ClientField::Phone),
    (&["endereco", "address"], ClientField::Address),
    (&["cidade", "city"], ClientField::City),
    (&["estado", "state", "uf"], ClientField::State),
    (&["cep", "zipcode"], ClientField::Cep),
];

/// Folded state names → federative unit code
const STATE_NAMES: &[(&str, &str)] = &[
    ("acre", "AC"),
    ("alagoas", "AL"),
    ("amapa", "AP"),
    ("amazonas", "AM"),
    ("bahia", "BA"),
    ("ceara", "CE"),
    ("distrito federal", "DF"),
    ("espirito santo", "ES"),
    ("goias", "GO"),
    ("maranhao", "MA"),
    ("mato grosso", "MT"),
    ("mato grosso do sul", "MS"),
    ("minas gerais", "MG"),
    ("para", "PA"),
    ("paraiba", "PB"),
    ("parana", "PR"),
    ("pernambuco", "PE"),
    ("piaui", "PI"),
    ("rio de janeiro", "RJ"),
    ("rio grande do norte", "RN"),
    ("rio grande do sul", "RS"),
    ("rondonia", "RO"),
    ("roraima", "RR"),
    ("santa catarina", "SC"),
    ("sao paulo", "SP"),
    ("sergipe", "SE"),
    ("tocantins", "TO"),
];

const SHORT_ADDRESS_SUFFIX: &str = ", número não informado";

/// Lowercase and strip Portuguese diacritics
pub fn fold(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

pub fn classify_header(header: &str) -> Option<ClientField> {
    let folded = fold(header);
    HEADER_KEYWORDS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| folded.contains(k)))
        .map(|(_, field)| *field)
}

/// Two-letter code for a state name; short values pass through untouched
/// and unknown names come back uppercased.
pub fn state_code(value: &str) -> String {
    if value.chars().count() <= 2 {
        return value.to_string();
    }
    let folded = fold(value);
    STATE_NAMES
        .iter()
        .find(|(name, _)| *name == folded)
        .map(|(_, code)| code.to_string())
        .unwrap_or_else(|| value.to_uppercase())
}

fn map_cpf(value: &str) -> Option<String> {
    let digits = digits_only(value);
    (digits.len() == 11).then_some(digits)
}

fn map_address(value: &str) -> String {
    if value.chars().count() < 5 {
        format!("{}{}", value, SHORT_ADDRESS_SUFFIX)
    } else {
        value.to_string()
    }
}

fn map_cep(value: &str) -> Option<String> {
    let digits = digits_only(value);
    match digits.len() {
        8 => Some(format!("{}-{}", &digits[..5], &digits[5..])),
        5 => Some(format!("{}-000", digits)),
        _ => None,
    }
}

/// Map one row given as `(header, value)` pairs in column order.
///
/// Blank cells are skipped. When two columns feed the same field the later
/// one wins, including when it cleans to nothing.
pub fn map_row<H, V>(row: impl IntoIterator<Item = (H, V)>) -> ClientAttributes
where
    H: AsRef<str>,
    V: AsRef<str>,
{
    let mut attrs = ClientAttributes::default();

    for (header, value) in row {
        let value = value.as_ref().trim();
        if value.is_empty() {
            continue;
        }
        let Some(field) = classify_header(header.as_ref()) else {
            continue;
        };

        match field {
            ClientField::Name => attrs.name = Some(value.to_string()),
            ClientField::Cpf => attrs.cpf = map_cpf(value),
            ClientField::Phone => attrs.phone = Some(value.to_string()),
            ClientField::Address => attrs.address = Some(map_address(value)),
            ClientField::City => attrs.city = Some(value.to_string()),
            ClientField::State => attrs.state = Some(state_code(value)),
            ClientField::Cep => attrs.cep = map_cep(value),
        }
    }

    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        pairs.iter().copied()
    }

    #[test]
    fn test_portuguese_headers() {
        let attrs = map_row(row(&[
            ("nome", "  Maria Santos "),
            ("cpf", "529.982.247-25"),
            ("telefone", "(21) 98888-7777"),
            ("endereço", "Av. Atlântica 1000"),
            ("cidade", "Rio de Janeiro"),
            ("estado", "Rio de Janeiro"),
            ("cep", "22021-000"),
        ]));

        assert_eq!(attrs.name.as_deref(), Some("Maria Santos"));
        assert_eq!(attrs.cpf.as_deref(), Some("52998224725"));
        assert_eq!(attrs.phone.as_deref(), Some("(21) 98888-7777"));
        assert_eq!(attrs.address.as_deref(), Some("Av. Atlântica 1000"));
        assert_eq!(attrs.city.as_deref(), Some("Rio de Janeiro"));
        assert_eq!(attrs.state.as_deref(), Some("RJ"));
        assert_eq!(attrs.cep.as_deref(), Some("22021-000"));
    }

    #[test]
    fn test_english_and_mixed_case_headers() {
        let attrs = map_row(row(&[
            ("Full Name", "John"),
            ("Phone Number", "11999999999"),
            ("ADDRESS", "Main Street 1"),
            ("City", "Santos"),
            ("UF", "sp"),
            ("ZipCode", "11000000"),
        ]));

        assert_eq!(attrs.name.as_deref(), Some("John"));
        assert_eq!(attrs.phone.as_deref(), Some("11999999999"));
        assert_eq!(attrs.state.as_deref(), Some("sp"));
        assert_eq!(attrs.cep.as_deref(), Some("11000-000"));
    }

    #[test]
    fn test_header_classification_priority() {
        assert_eq!(classify_header("Endereço"), Some(ClientField::Address));
        assert_eq!(classify_header("ENDERECO"), Some(ClientField::Address));
        assert_eq!(classify_header("celular/fone"), Some(ClientField::Phone));
        assert_eq!(classify_header("cpf do cliente"), Some(ClientField::Cpf));
        assert_eq!(classify_header("email"), None);
    }

    #[test]
    fn test_cpf_requires_eleven_digits() {
        let attrs = map_row(row(&[("cpf", "123.456")]));
        assert!(attrs.cpf.is_none());
    }

    #[test]
    fn test_short_address_is_completed() {
        let attrs = map_row(row(&[("endereco", "s/n")]));
        assert_eq!(attrs.address.as_deref(), Some("s/n, número não informado"));
    }

    #[test]
    fn test_cep_rules() {
        assert_eq!(map_cep("01310"), Some("01310-000".to_string()));
        assert_eq!(map_cep("01310-100"), Some("01310-100".to_string()));
        assert_eq!(map_cep("0131"), None);
    }

    #[test]
    fn test_state_lookup() {
        assert_eq!(state_code("São Paulo"), "SP");
        assert_eq!(state_code("SAO PAULO"), "SP");
        assert_eq!(state_code("Mato Grosso do Sul"), "MS");
        assert_eq!(state_code("Pará"), "PA");
        assert_eq!(state_code("mg"), "mg");
        assert_eq!(state_code("Atlantis"), "ATLANTIS");
    }

    #[test]
    fn test_blank_cells_are_skipped() {
        let attrs = map_row(row(&[("nome", "   "), ("cidade", ""), ("cpf", "11144477735")]));
        assert!(attrs.name.is_none());
        assert!(attrs.city.is_none());
        assert_eq!(attrs.cpf.as_deref(), Some("11144477735"));
    }

    #[test]
    fn test_unknown_headers_ignored() {
        let attrs = map_row(row(&[("email", "a@b.c"), ("observacao", "vip")]));
        assert_eq!(attrs, ClientAttributes::default());
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let pairs = [("nome", "Ana"), ("estado", "Bahia"), ("cep", "40000000")];
        assert_eq!(map_row(row(&pairs)), map_row(row(&pairs)));
    }
}

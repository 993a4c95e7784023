use serde::Serialize;
use validator::ValidationErrors;

/// Wrapper used for every JSON response, success or failure.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub errors: Option<Vec<FieldError>>,
}

impl<T> Envelope<T> {
    pub fn success(payload: T) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            message: None,
            errors: None,
        }
    }
}

impl Envelope<()> {
    pub fn failure(message: impl Into<String>, errors: Option<Vec<FieldError>>) -> Self {
        Self {
            success: false,
            payload: None,
            message: Some(message.into()),
            errors,
        }
    }
}

/// One problem with the request, located by path (`["body", "address"]`).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    pub fn body(field: Option<&str>, msg: impl Into<String>, kind: impl Into<String>) -> Self {
        let mut loc = vec!["body".to_string()];
        loc.extend(field.map(str::to_string));
        Self {
            loc,
            msg: msg.into(),
            kind: kind.into(),
        }
    }

    /// Flattens validator output, sorted by field for stable responses.
    pub fn from_validation(errors: &ValidationErrors) -> Vec<Self> {
        let mut out: Vec<Self> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let msg = e
                        .message
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| format!("invalid value for {field}"));
                    Self::body(Some(&*field), msg, e.code.to_string())
                })
            })
            .collect();
        out.sort_by(|a, b| a.loc.cmp(&b.loc));
        out
    }
}

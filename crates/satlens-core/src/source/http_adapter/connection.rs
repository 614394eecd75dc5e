use reqwest::Url;

use crate::error::CoreError;

/// Validate a configured base or endpoint URL. Only HTTP(S) is accepted.
pub(crate) fn parse_endpoint(endpoint: &str) -> Result<Url, CoreError> {
    let parsed = Url::parse(endpoint).map_err(|e| {
        CoreError::InvalidConfig(format!(
            "invalid endpoint `{endpoint}`: expected HTTP(S) URL ({e})"
        ))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(CoreError::InvalidConfig(format!(
            "unsupported endpoint scheme `{other}`; expected http or https"
        ))),
    }
}

/// Append percent-encoded path segments to `base`, keeping any path the
/// base already carries (e.g. `https://host/api` + `["tx", id]`).
pub(super) fn join_segments(base: &Url, segments: &[&str]) -> Result<Url, CoreError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| CoreError::InvalidConfig(format!("endpoint `{base}` cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

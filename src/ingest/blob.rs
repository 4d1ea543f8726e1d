// src/ingest/blob.rs

use url::Url;

/// `https://{account}.blob.core.windows.net/{container}/{file}{sas}`, where
/// `sas` is the full query string including its leading `?`.
pub fn blob_url(account: &str, container: &str, file: &str, sas_token: &str) -> String {
    format!(
        "https://{}.blob.core.windows.net/{}/{}{}",
        account, container, file, sas_token
    )
}

/// Strip the query (and with it any SAS signature) so a URL is safe to log.
pub fn redact_sas(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut u) => {
            u.set_query(None);
            u.to_string()
        }
        Err(_) => url.split('?').next().unwrap_or_default().to_owned(),
    }
}

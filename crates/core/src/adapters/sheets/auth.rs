use error_stack::ResultExt;
use google_sheets4::oauth2::{self, authenticator::Authenticator};

use super::http_client::{HttpClient, HttpsConnector};
use crate::adapters::config::sheets_config::SpreadsheetConfig;
use crate::ports::spreadsheet_backend::{BackendError, BackendResult};

/// A service account authenticator and the email it acts as.
pub struct ServiceAccount {
    pub email: String,
    pub authenticator: Authenticator<HttpsConnector>,
}

pub async fn auth(config: &SpreadsheetConfig, client: HttpClient) -> BackendResult<ServiceAccount> {
    let priv_key_path = config.priv_key.as_ref();
    let secret: oauth2::ServiceAccountKey = oauth2::read_service_account_key(priv_key_path)
        .await
        .change_context(BackendError::Authentication)
        .attach_printable_lazy(|| {
            format!(
                "Could not read service account private key at '{}'. Please provide a valid service account private key.",
                priv_key_path
            )
        })?;

    let email = secret.client_email.clone();
    let authenticator = oauth2::ServiceAccountAuthenticator::with_client(secret, client)
        .build()
        .await
        .change_context(BackendError::Authentication)
        .attach_printable("Could not create an authenticator")?;

    Ok(ServiceAccount {
        email,
        authenticator,
    })
}

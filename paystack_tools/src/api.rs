use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::PaystackConfig,
    data_objects::{Bank, Envelope, NewTransfer, NewTransferRecipient, ResolvedAccount, Transfer, TransferRecipient},
    PaystackApiError,
};

#[derive(Clone)]
pub struct PaystackApi {
    config: PaystackConfig,
    client: Arc<Client>,
}

impl PaystackApi {
    pub fn new(config: PaystackConfig) -> Result<Self, PaystackApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let bearer = format!("Bearer {}", config.secret_key.reveal());
        let val = HeaderValue::from_str(&bearer).map_err(|e| PaystackApiError::Initialization(e.to_string()))?;
        headers.insert("Authorization", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| PaystackApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<B>,
    ) -> Result<T, PaystackApiError> {
        let url = self.url(path);
        trace!("Sending REST query: {url}");
        let mut req = self.client.request(method, url);
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| PaystackApiError::RestResponseError(e.to_string()))?;
        if response.status().is_success() {
            trace!("REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| PaystackApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| PaystackApiError::RestResponseError(e.to_string()))?;
            Err(PaystackApiError::QueryError { status, message })
        }
    }

    /// Runs a REST query and unwraps the standard Paystack envelope, converting `status: false`
    /// responses into [`PaystackApiError::Rejected`].
    async fn api_call<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<B>,
    ) -> Result<T, PaystackApiError> {
        let envelope = self.rest_query::<Envelope<T>, B>(method, path, params, body).await?;
        if !envelope.status {
            return Err(PaystackApiError::Rejected(envelope.message));
        }
        envelope.data.ok_or(PaystackApiError::EmptyResponse)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url)
    }

    pub async fn list_banks(&self, country: &str) -> Result<Vec<Bank>, PaystackApiError> {
        const PER_PAGE: usize = 100;
        let per_page = PER_PAGE.to_string();
        let mut banks = vec![];
        let mut page = 1usize;
        loop {
            let page_no = page.to_string();
            let params = [("country", country), ("perPage", per_page.as_str()), ("page", page_no.as_str())];
            let batch = self.api_call::<Vec<Bank>, ()>(Method::GET, "/bank", &params, None).await?;
            let batch_len = batch.len();
            banks.extend(batch);
            if batch_len < PER_PAGE {
                break;
            }
            page += 1;
        }
        debug!("Fetched {} banks for {country}", banks.len());
        Ok(banks)
    }

    pub async fn resolve_account(
        &self,
        account_number: &str,
        bank_code: &str,
    ) -> Result<ResolvedAccount, PaystackApiError> {
        let params = [("account_number", account_number), ("bank_code", bank_code)];
        debug!("Resolving account ****{} at bank {bank_code}", last4(account_number));
        let resolved = self.api_call::<ResolvedAccount, ()>(Method::GET, "/bank/resolve", &params, None).await?;
        info!("Resolved account ****{} to {}", last4(account_number), resolved.account_name);
        Ok(resolved)
    }

    pub async fn create_transfer_recipient(
        &self,
        recipient: NewTransferRecipient,
    ) -> Result<TransferRecipient, PaystackApiError> {
        debug!("Creating transfer recipient for account ****{}", last4(&recipient.account_number));
        let result = self
            .api_call::<TransferRecipient, NewTransferRecipient>(Method::POST, "/transferrecipient", &[], Some(recipient))
            .await?;
        info!("Created transfer recipient {}", result.recipient_code);
        Ok(result)
    }

    pub async fn initiate_transfer(&self, transfer: NewTransfer) -> Result<Transfer, PaystackApiError> {
        debug!("Initiating transfer {} of {}", transfer.reference, transfer.amount);
        let result = self.api_call::<Transfer, NewTransfer>(Method::POST, "/transfer", &[], Some(transfer)).await?;
        info!("Initiated transfer {}. Status: {}", result.reference, result.status);
        Ok(result)
    }

    pub async fn fetch_transfer(&self, reference: &str) -> Result<Transfer, PaystackApiError> {
        let path = format!("/transfer/verify/{reference}");
        debug!("Verifying transfer {reference}");
        let result = self.api_call::<Transfer, ()>(Method::GET, &path, &[], None).await?;
        debug!("Transfer {reference} status: {}", result.status);
        Ok(result)
    }
}

fn last4(account_number: &str) -> &str {
    let n = account_number.len();
    &account_number[n.saturating_sub(4)..]
}

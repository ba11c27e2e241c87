// src/vip.rs

use crate::error::AppError;
use crate::UserId;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// VIP lookup and payment verification
#[async_trait]
pub trait VipVerifier: Send + Sync {
    async fn check_vip(&self, user_id: UserId) -> bool;

    /// Verify a payment token and return the message shown to the user
    async fn verify_payment(&self, user_id: UserId, token: &str) -> String;
}

#[derive(Serialize)]
struct PaymentRequest<'a> {
    user_id: UserId,
    token: &'a str,
}

#[derive(Deserialize)]
struct PaymentResponse {
    valid: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize, Deserialize, Default)]
struct VipState {
    users: BTreeSet<UserId>,
}

/// VIP users from configuration plus users activated through payment
pub struct VipRegistry {
    users: Mutex<BTreeSet<UserId>>,
    payment_url: Option<String>,
    client: Client,
    state_path: Option<PathBuf>,
}

impl VipRegistry {
    pub fn new(
        configured: impl IntoIterator<Item = UserId>,
        payment_url: Option<String>,
        client: Client,
    ) -> Self {
        Self {
            users: Mutex::new(configured.into_iter().collect()),
            payment_url,
            client,
            state_path: None,
        }
    }

    /// Persist activated users to `path`, merging anything already stored there
    pub fn with_state_file(mut self, path: PathBuf) -> Result<Self, AppError> {
        if path.exists() {
            let json = std::fs::read_to_string(&path)?;
            let state: VipState = serde_json::from_str(&json)?;
            debug!("Loaded {} VIP users from {:?}", state.users.len(), path);
            self.lock().extend(state.users);
        }
        self.state_path = Some(path);
        Ok(self)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<UserId>> {
        match self.users.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Grant VIP status and persist it if a state file is configured
    pub async fn grant(&self, user_id: UserId) -> Result<(), AppError> {
        let state = {
            let mut users = self.lock();
            users.insert(user_id);
            VipState {
                users: users.clone(),
            }
        };

        if let Some(path) = self.state_path.clone() {
            let json = serde_json::to_string_pretty(&state)?;
            tokio::fs::write(path, json).await?;
        }
        info!("VIP granted to {}", user_id);
        Ok(())
    }

    async fn ask_payment_server(&self, url: &str, user_id: UserId, token: &str) -> Result<PaymentResponse, AppError> {
        let response = self
            .client
            .post(url)
            .json(&PaymentRequest { user_id, token })
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<PaymentResponse>().await?)
    }
}

#[async_trait]
impl VipVerifier for VipRegistry {
    async fn check_vip(&self, user_id: UserId) -> bool {
        self.lock().contains(&user_id)
    }

    async fn verify_payment(&self, user_id: UserId, token: &str) -> String {
        let token = token.trim();
        if token.is_empty() {
            return "Please send your payment id after /vip.".to_string();
        }

        let url = match &self.payment_url {
            Some(url) => url.clone(),
            None => {
                warn!("payment verification requested by {} but no endpoint is configured", user_id);
                return "Payment verification is not available right now.".to_string();
            }
        };

        match self.ask_payment_server(&url, user_id, token).await {
            Ok(PaymentResponse { valid: true, message }) => {
                if let Err(e) = self.grant(user_id).await {
                    error!("Failed to persist VIP status for {}: {}", user_id, e);
                }
                message.unwrap_or_else(|| "Payment verified. Welcome, VIP!".to_string())
            }
            Ok(PaymentResponse { valid: false, message }) => {
                message.unwrap_or_else(|| "Payment could not be verified.".to_string())
            }
            Err(e) => {
                error!("Payment verification for {} failed: {}", user_id, e);
                "Payment verification failed, please try again later.".to_string()
            }
        }
    }
}

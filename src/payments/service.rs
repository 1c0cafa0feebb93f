//! Crediting verified payments

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::PaymentError;
use super::{MoneyFusion, PayDunya, VerifiedPayment, Wave};
use crate::config::PaymentsConfig;
use crate::ledger::{Credit, Ledger, LedgerReceipt, TransactionKind};
use crate::money::parse_decimal;

/// Account facts the payment flow needs
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Who referred `user_id`, if anyone
    async fn referrer_of(&self, user_id: Uuid) -> Result<Option<Uuid>, PaymentError>;

    /// Completed deposits of `user_id`, including one just credited
    async fn completed_deposit_count(&self, user_id: Uuid) -> Result<i64, PaymentError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    Credited {
        receipt: LedgerReceipt,
        referral_bonus: Option<Decimal>,
    },
    /// Redelivery of a notification that was already credited
    AlreadyProcessed,
    /// Not settled yet (pending, cancelled, failed); nothing credited
    Ignored,
}

pub struct PaymentService {
    ledger: Arc<dyn Ledger>,
    accounts: Arc<dyn AccountDirectory>,
    referral_bonus_percent: Decimal,
    decimals: u32,
    moneyfusion: Option<MoneyFusion>,
    paydunya: Option<PayDunya>,
    wave: Option<Wave>,
}

impl PaymentService {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        accounts: Arc<dyn AccountDirectory>,
        referral_bonus_percent: Decimal,
        decimals: u32,
    ) -> Self {
        Self {
            ledger,
            accounts,
            referral_bonus_percent,
            decimals,
            moneyfusion: None,
            paydunya: None,
            wave: None,
        }
    }

    /// Service with every gateway that has settings
    pub fn from_config(
        ledger: Arc<dyn Ledger>,
        accounts: Arc<dyn AccountDirectory>,
        config: &PaymentsConfig,
        decimals: u32,
    ) -> Result<Self, PaymentError> {
        let mut service = Self::new(ledger, accounts, config.referral_bonus_percent, decimals);
        if let Some(settings) = &config.moneyfusion {
            service.moneyfusion = Some(MoneyFusion::from_settings(settings)?);
        }
        if let Some(settings) = &config.paydunya {
            service.paydunya = Some(PayDunya::new(&settings.master_key));
        }
        if let Some(settings) = &config.wave {
            service.wave = Some(Wave::new(settings));
        }
        info!(
            moneyfusion = service.moneyfusion.is_some(),
            paydunya = service.paydunya.is_some(),
            wave = service.wave.is_some(),
            "Payment gateways configured"
        );
        Ok(service)
    }

    pub fn with_moneyfusion(mut self, gateway: MoneyFusion) -> Self {
        self.moneyfusion = Some(gateway);
        self
    }

    pub fn with_paydunya(mut self, gateway: PayDunya) -> Self {
        self.paydunya = Some(gateway);
        self
    }

    pub fn with_wave(mut self, gateway: Wave) -> Self {
        self.wave = Some(gateway);
        self
    }

    pub async fn receive_moneyfusion(&self, body: &[u8]) -> Result<PaymentOutcome, PaymentError> {
        let gateway = self
            .moneyfusion
            .as_ref()
            .ok_or(PaymentError::NotConfigured("moneyfusion"))?;
        let payment = gateway.verify(body).await?;
        self.settle(&payment).await
    }

    pub async fn receive_paydunya(&self, body: &[u8]) -> Result<PaymentOutcome, PaymentError> {
        let gateway = self
            .paydunya
            .as_ref()
            .ok_or(PaymentError::NotConfigured("paydunya"))?;
        let payment = gateway.verify(body)?;
        self.settle(&payment).await
    }

    pub async fn receive_wave(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<PaymentOutcome, PaymentError> {
        let gateway = self
            .wave
            .as_ref()
            .ok_or(PaymentError::NotConfigured("wave"))?;
        let payment = gateway.verify(signature.ok_or(PaymentError::InvalidSignature)?, body)?;
        self.settle(&payment).await
    }

    /// Credit a settled payment once, plus the referral bonus of a first deposit
    pub async fn settle(&self, payment: &VerifiedPayment) -> Result<PaymentOutcome, PaymentError> {
        if !payment.settled {
            info!(
                gateway = %payment.gateway,
                reference = %payment.reference,
                "Payment not settled; acknowledged"
            );
            return Ok(PaymentOutcome::Ignored);
        }
        // Anything finer than the currency precision would be rounded by storage
        let amount = parse_decimal(payment.amount, self.decimals).map_err(|e| {
            warn!(
                gateway = %payment.gateway,
                reference = %payment.reference,
                amount = %payment.amount,
                error = %e,
                "Payment amount rejected"
            );
            PaymentError::InvalidPayload(format!("amount {}: {e}", payment.amount))
        })?;

        let reference = format!("{}:{}", payment.gateway, payment.reference);
        let receipt = self
            .ledger
            .credit(&Credit {
                user_id: payment.user_id,
                amount,
                source: TransactionKind::Deposit,
                reference: reference.clone(),
                description: format!("Deposit via {}", payment.gateway),
            })
            .await?;

        // A crash between the deposit and the bonus is healed by redelivery
        let referral_bonus = self.referral_bonus(payment, &reference).await?;

        if receipt.replayed {
            info!(reference = %reference, "Payment already credited");
            return Ok(PaymentOutcome::AlreadyProcessed);
        }

        info!(
            user_id = %payment.user_id,
            reference = %reference,
            amount = %amount,
            balance = %receipt.after.balance,
            "Deposit credited"
        );
        Ok(PaymentOutcome::Credited {
            receipt,
            referral_bonus,
        })
    }

    async fn referral_bonus(
        &self,
        payment: &VerifiedPayment,
        reference: &str,
    ) -> Result<Option<Decimal>, PaymentError> {
        if self.referral_bonus_percent <= Decimal::ZERO {
            return Ok(None);
        }
        let Some(referrer) = self.accounts.referrer_of(payment.user_id).await? else {
            return Ok(None);
        };
        if self.accounts.completed_deposit_count(payment.user_id).await? != 1 {
            return Ok(None);
        }

        let bonus = (payment.amount * self.referral_bonus_percent / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(self.decimals, RoundingStrategy::ToZero);
        if bonus <= Decimal::ZERO {
            return Ok(None);
        }

        let result = self
            .ledger
            .credit(&Credit {
                user_id: referrer,
                amount: bonus,
                source: TransactionKind::ReferralBonus,
                reference: reference.to_string(),
                description: format!("Referral bonus for {}", payment.user_id),
            })
            .await;

        match result {
            Ok(receipt) if !receipt.replayed => {
                info!(referrer = %referrer, referred = %payment.user_id, bonus = %bonus, "Referral bonus credited");
                Ok(Some(bonus))
            }
            Ok(_) => Ok(Some(bonus)),
            Err(e) => {
                warn!(referrer = %referrer, error = %e, "Referral bonus failed");
                Err(e.into())
            }
        }
    }
}

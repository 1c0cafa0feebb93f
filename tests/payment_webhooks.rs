use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use sms_ledger::config::WaveSettings;
use sms_ledger::payments::moneyfusion::{self, Notification};
use sms_ledger::payments::paydunya::master_key_hash;
use sms_ledger::payments::{Gateway, PayDunya, PaymentError, Wave};

const WAVE_SECRET: &str = "wave_sn_WHS_xz4m6g8rjs9bshxy05xkg";
const NOW: i64 = 1_700_000_000;

fn wave() -> Wave {
    Wave::new(&WaveSettings {
        webhook_secret: WAVE_SECRET.to_string(),
        tolerance_secs: 300,
    })
}

fn wave_body(user: Uuid, kind: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": "EV_QvEZuDSQbLdI",
        "type": kind,
        "data": {
            "id": "cos-18qq25rgr100a",
            "amount": "1000",
            "checkout_status": "complete",
            "client_reference": user.to_string(),
            "currency": "XOF",
            "payment_status": "succeeded"
        }
    }))
    .unwrap()
}

fn sign(secret: &str, ts: i64, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(ts.to_string().as_bytes());
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[test]
fn wave_signed_completion_is_settled() {
    let user = Uuid::new_v4();
    let body = wave_body(user, "checkout.session.completed");
    let header = format!("t={NOW},v1={}", sign(WAVE_SECRET, NOW, &body));

    let payment = wave().verify_at(&header, &body, NOW + 5).unwrap();
    assert_eq!(payment.gateway, Gateway::Wave);
    assert_eq!(payment.reference, "cos-18qq25rgr100a");
    assert_eq!(payment.user_id, user);
    assert_eq!(payment.amount, Decimal::from(1000));
    assert!(payment.settled);
}

#[test]
fn wave_accepts_any_rotated_signature() {
    let body = wave_body(Uuid::new_v4(), "checkout.session.completed");
    let header = format!(
        "t={NOW},v1={},v1={}",
        sign("old-secret", NOW, &body),
        sign(WAVE_SECRET, NOW, &body)
    );
    assert!(wave().verify_at(&header, &body, NOW).is_ok());
}

#[test]
fn wave_rejects_tampering_and_replays() {
    let body = wave_body(Uuid::new_v4(), "checkout.session.completed");
    let header = format!("t={NOW},v1={}", sign(WAVE_SECRET, NOW, &body));

    let mut tampered = body.clone();
    tampered.extend_from_slice(b" ");
    assert_eq!(
        wave().verify_at(&header, &tampered, NOW).unwrap_err(),
        PaymentError::InvalidSignature
    );
    assert_eq!(
        wave().verify_at(&header, &body, NOW + 3600).unwrap_err(),
        PaymentError::SignatureExpired
    );
    assert_eq!(
        wave().verify_at("v1=deadbeef", &body, NOW).unwrap_err(),
        PaymentError::InvalidSignature
    );
}

#[test]
fn wave_other_events_are_not_credited() {
    let body = wave_body(Uuid::new_v4(), "checkout.session.payment_failed");
    let header = format!("t={NOW},v1={}", sign(WAVE_SECRET, NOW, &body));
    assert!(!wave().verify_at(&header, &body, NOW).unwrap().settled);
}

#[test]
fn paydunya_hash_gates_the_ipn() {
    let master_key = "wQzk9ZwR-Qq9m-0hD0-zpud-je5coGC3FHKW";
    let user = Uuid::new_v4();
    let ipn = |hash: String| {
        serde_json::to_vec(&json!({
            "data": {
                "hash": hash,
                "status": "completed",
                "invoice": {"token": "test_x0Ft3nCzvR", "total_amount": 7500},
                "custom_data": {"user_id": user.to_string()}
            }
        }))
        .unwrap()
    };

    let gateway = PayDunya::new(master_key);
    let payment = gateway.verify(&ipn(master_key_hash(master_key))).unwrap();
    assert_eq!(payment.reference, "test_x0Ft3nCzvR");
    assert_eq!(payment.amount, Decimal::from(7500));
    assert!(payment.settled);

    // Hash is compared case-insensitively
    let upper = master_key_hash(master_key).to_ascii_uppercase();
    assert!(gateway.verify(&ipn(upper)).is_ok());

    assert_eq!(
        gateway.verify(&ipn(master_key_hash("guess"))).unwrap_err(),
        PaymentError::InvalidSignature
    );
}

#[test]
fn moneyfusion_notification_fields() {
    let user = Uuid::new_v4();
    let notification: Notification = serde_json::from_value(json!({
        "event": "payin.session.completed",
        "tokenPay": " tok_8812 ",
        "Montant": "2500",
        "personal_Info": [{"userId": user.to_string(), "orderId": 7}]
    }))
    .unwrap();

    let payment = moneyfusion::interpret(&notification).unwrap();
    assert_eq!(payment.gateway, Gateway::MoneyFusion);
    assert_eq!(payment.reference, "tok_8812");
    assert_eq!(payment.amount, Decimal::from(2500));
    assert!(payment.settled);

    let pending = Notification {
        event: "payin.session.pending".into(),
        ..notification.clone()
    };
    assert!(!moneyfusion::interpret(&pending).unwrap().settled);

    let anonymous = Notification {
        personal_info: Vec::new(),
        ..notification
    };
    assert!(matches!(
        moneyfusion::interpret(&anonymous),
        Err(PaymentError::InvalidPayload(_))
    ));
}

//! Every adapter must land on the same `ActivationStatus` / `ProviderError`
//! vocabulary, whatever its wire format.

use sms_ledger::providers::{
    ActivationStatus, ProviderError, extract_code, five_sim, onlinesim, sms_activate, smspva,
};

fn received(code: &str) -> ActivationStatus {
    ActivationStatus::Received {
        code: code.to_string(),
        text: None,
    }
}

#[test]
fn sold_out_maps_to_no_numbers_everywhere() {
    assert_eq!(
        sms_activate::parse_number_response("NO_NUMBERS").unwrap_err(),
        ProviderError::NoNumbers
    );
    assert_eq!(
        five_sim::parse_order(200, "no free phones").unwrap_err(),
        ProviderError::NoNumbers
    );
    assert_eq!(
        onlinesim::parse_get_num(r#"{"response":"NO_NUMBER"}"#).unwrap_err(),
        ProviderError::NoNumbers
    );
}

#[test]
fn sold_out_is_an_explicit_rejection() {
    // Explicit errors refund immediately; ambiguous ones wait for recovery
    assert!(ProviderError::NoNumbers.is_explicit());
    assert!(
        !sms_activate::parse_number_response("<html>502</html>")
            .unwrap_err()
            .is_explicit()
    );
    assert!(!five_sim::parse_order(503, "").unwrap_err().is_explicit());
}

#[test]
fn issued_numbers_are_normalized() {
    let order = sms_activate::parse_number_response("ACCESS_NUMBER:635468024:79584012345").unwrap();
    assert_eq!(order.order_id, "635468024");
    assert_eq!(order.phone, "+79584012345");

    let order = smspva::parse_number_response(
        r#"{"response":"1","number":"9685156912","id":25623,"CountryCode":"+7"}"#,
    )
    .unwrap();
    assert_eq!(order.order_id, "25623");
    assert_eq!(order.phone, "+79685156912");
}

#[test]
fn code_delivery_across_providers() {
    assert_eq!(
        sms_activate::parse_status_response("STATUS_OK:48213").unwrap(),
        received("48213")
    );
    assert_eq!(
        smspva::parse_sms_response(r#"{"response":"1","number":"9685156912","sms":"734295"}"#)
            .unwrap(),
        received("734295")
    );

    let state = onlinesim::parse_state(
        r#"[{"number":"+79101234567","response":"TZ_NUM_ANSWER","msg":"58123","tzid":1234567}]"#,
    )
    .unwrap();
    assert_eq!(onlinesim::state_to_status(&state).unwrap(), received("58123"));
}

#[test]
fn waiting_and_expiry_across_providers() {
    assert_eq!(
        sms_activate::parse_status_response("STATUS_WAIT_CODE").unwrap(),
        ActivationStatus::Waiting
    );
    assert_eq!(
        sms_activate::parse_status_response("NO_ACTIVATION").unwrap(),
        ActivationStatus::Expired
    );
    assert_eq!(
        smspva::parse_sms_response(r#"{"response":"2"}"#).unwrap(),
        ActivationStatus::Waiting
    );

    let gone = onlinesim::parse_state("[]").unwrap();
    assert_eq!(
        onlinesim::state_to_status(&gone).unwrap(),
        ActivationStatus::Expired
    );
}

#[test]
fn five_sim_falls_back_to_the_sms_text() {
    let order = five_sim::parse_order(
        200,
        r#"{"id": 1, "phone": "+4470000000", "status": "RECEIVED",
            "sms": [{"text": "Your code is 771204", "code": ""}]}"#,
    )
    .unwrap();
    assert_eq!(
        five_sim::activation_status(&order),
        ActivationStatus::Received {
            code: "771204".into(),
            text: Some("Your code is 771204".into()),
        }
    );
}

#[test]
fn rental_inbox_is_ordered_and_codes_extracted() {
    let body = r#"{"status":"success","quantity":"2","values":{
        "1":{"phoneFrom":"Telegram","text":"Login code 55021","date":"2024-01-30 14:35:00"},
        "0":{"phoneFrom":"WhatsApp","text":"Your code: 913-442","date":"2024-01-30 14:31:25"}}}"#;
    let inbox = sms_activate::parse_rent_status(body).unwrap();

    assert_eq!(inbox.len(), 2);
    assert_eq!(inbox[0].from.as_deref(), Some("WhatsApp"));
    assert_eq!(inbox[0].code, None);
    assert_eq!(inbox[1].code.as_deref(), Some("55021"));

    let empty = sms_activate::parse_rent_status(r#"{"status":"error","message":"STATUS_WAIT_CODE"}"#)
        .unwrap();
    assert!(empty.is_empty());
}

#[test]
fn cancel_of_a_closed_order_is_acknowledged() {
    assert!(sms_activate::parse_set_status_response("ACCESS_CANCEL").is_ok());
    assert!(sms_activate::parse_rent_ack(r#"{"status":"error","message":"ALREADY_CANCEL"}"#).is_ok());
    assert!(onlinesim::parse_ack(r#"{"response":"ERROR_NO_OPERATIONS"}"#).is_ok());
    assert!(smspva::parse_ack(r#"{"response":"3"}"#).is_ok());
}

#[test]
fn code_extraction() {
    assert_eq!(extract_code("G-482913 is your code").as_deref(), Some("482913"));
    assert_eq!(extract_code("call 12 or 345"), None);
}

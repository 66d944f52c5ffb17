//! End-to-end purchase-flow scenarios through the gateway

use agentpay_credentials::RegisterCredential;
use agentpay_gateway::{error_payload, GatewayConfig, PaymentsGateway};
use agentpay_mandates::CartItemInput;
use agentpay_types::{
    AgentPayError, Amount, Currency, MandateId, PaymentMethodType, ProductId, TransactionId,
    UserId,
};

fn gateway() -> PaymentsGateway {
    PaymentsGateway::new(GatewayConfig::for_tests()).unwrap()
}

fn cart(price: f64) -> Vec<CartItemInput> {
    vec![CartItemInput {
        product_id: ProductId::new(),
        name: "Test Product".to_string(),
        unit_price: Amount::from_major(price, Currency::USD),
        quantity: 1,
    }]
}

fn visa_request(user_id: &UserId, max_amount: Option<f64>) -> RegisterCredential {
    RegisterCredential {
        user_id: user_id.clone(),
        method_type: PaymentMethodType::Card,
        sensitive_data: serde_json::json!({
            "card_number": "4111111111111234",
            "exp_month": 12,
            "exp_year": 2027,
            "cvv": "123",
        }),
        brand: "Visa".to_string(),
        is_default: true,
        nickname: Some("My Visa Card".to_string()),
        last_four: None,
        supported_currencies: None,
        max_transaction_amount: max_amount.map(|a| Amount::from_major(a, Currency::USD)),
        min_transaction_amount: None,
        expires_at: None,
    }
}

fn wrong_code(code: &str) -> String {
    if code == "000000" {
        "000001".to_string()
    } else {
        "000000".to_string()
    }
}

/// Scenario A: full signed flow ends in a human-present payment mandate
#[tokio::test]
async fn test_full_purchase_flow() {
    let gateway = gateway();
    let user = UserId::new();
    let merchant = agentpay_types::MerchantId::new();

    let credential = gateway
        .register_credential(visa_request(&user, None))
        .await
        .unwrap();
    assert_eq!(credential.last_four, "1234");
    assert!(credential.is_default);

    // checkout: create + merchant-sign
    let detail = gateway
        .checkout(user.clone(), cart(999.0), Currency::USD, &merchant, "Test Store")
        .await
        .unwrap();
    assert_eq!(detail["signatures"]["merchant_signed"], true);
    assert_eq!(detail["signatures"]["user_signed"], false);
    assert_eq!(detail["signatures"]["awaiting"], "user_signature");
    let mandate_id = MandateId::parse(detail["mandate"]["id"].as_str().unwrap()).unwrap();

    // eligible methods
    let amount = Amount::from_major(999.0, Currency::USD);
    let methods = gateway.payment_methods(&user, &amount).await;
    assert_eq!(methods.len(), 1);
    let credential_id =
        agentpay_types::CredentialId::parse(&methods[0].credential_id).unwrap();

    // initiation: user-sign + OTP issue; demo mode exposes the code
    let initiation = gateway
        .initiate_payment(&mandate_id, &credential_id, &user)
        .await
        .unwrap();
    assert!(initiation.otp_required);
    assert_eq!(initiation.max_attempts, 3);
    assert_eq!(initiation.expires_in_seconds, 300);
    let code = initiation.demo_otp_code.clone().unwrap();

    let detail = gateway.mandate_detail(&mandate_id).await.unwrap();
    assert_eq!(detail["signatures"]["fully_signed"], true);

    // verification settles and derives the payment mandate
    let result = gateway.submit_otp(&mandate_id, &code, &user).await.unwrap();
    assert_eq!(result["status"], "completed");
    assert_eq!(result["payment_mandate"]["agent_presence"], true);
    assert_eq!(
        result["payment_mandate"]["transaction_modality"],
        "human_present"
    );
    assert_eq!(result["amount"]["currency"], "USD");
    // the sensitive instrument data never appears in the payload
    assert!(result["payment_method"].get("card_number").is_none());

    let transaction_id =
        TransactionId::parse(result["transaction_id"].as_str().unwrap()).unwrap();
    let status = gateway.transaction_status(&transaction_id).await.unwrap();
    assert_eq!(status["status"], "completed");
}

/// Scenario B: token issuance refused when the amount exceeds the
/// credential's transaction limit
#[tokio::test]
async fn test_token_refused_over_credential_limit() {
    let gateway = gateway();
    let user = UserId::new();
    let merchant = agentpay_types::MerchantId::new();

    let credential = gateway
        .register_credential(visa_request(&user, Some(50.0)))
        .await
        .unwrap();
    let credential_id = agentpay_types::CredentialId::parse(&credential.credential_id).unwrap();

    let detail = gateway
        .checkout(user.clone(), cart(100.0), Currency::USD, &merchant, "Store")
        .await
        .unwrap();
    let mandate_id = MandateId::parse(detail["mandate"]["id"].as_str().unwrap()).unwrap();

    let result = gateway.issue_token(&credential_id, &mandate_id).await;
    assert!(matches!(result, Err(AgentPayError::Validation { .. })));

    // and the method is not even eligible for that amount
    let methods = gateway
        .payment_methods(&user, &Amount::from_major(100.0, Currency::USD))
        .await;
    assert!(methods.is_empty());
}

/// Scenario C: three wrong codes exhaust the challenge; the correct code
/// afterwards is rejected and no transaction exists
#[tokio::test]
async fn test_attempt_exhaustion_blocks_settlement() {
    let gateway = gateway();
    let user = UserId::new();
    let merchant = agentpay_types::MerchantId::new();

    let credential = gateway
        .register_credential(visa_request(&user, None))
        .await
        .unwrap();
    let credential_id = agentpay_types::CredentialId::parse(&credential.credential_id).unwrap();

    let detail = gateway
        .checkout(user.clone(), cart(150.0), Currency::USD, &merchant, "Store")
        .await
        .unwrap();
    let mandate_id = MandateId::parse(detail["mandate"]["id"].as_str().unwrap()).unwrap();

    let initiation = gateway
        .initiate_payment(&mandate_id, &credential_id, &user)
        .await
        .unwrap();
    let code = initiation.demo_otp_code.unwrap();
    let wrong = wrong_code(&code);

    let first = gateway.submit_otp(&mandate_id, &wrong, &user).await;
    assert!(matches!(
        first,
        Err(AgentPayError::InvalidCode { attempts_remaining: 2 })
    ));
    let second = gateway.submit_otp(&mandate_id, &wrong, &user).await;
    assert!(matches!(
        second,
        Err(AgentPayError::InvalidCode { attempts_remaining: 1 })
    ));
    let third = gateway.submit_otp(&mandate_id, &wrong, &user).await;
    assert!(matches!(third, Err(AgentPayError::AttemptsExceeded { .. })));

    // correct code after exhaustion: closed challenge, no settlement
    let fourth = gateway.submit_otp(&mandate_id, &code, &user).await;
    match fourth {
        Err(ref e @ AgentPayError::ChallengeClosed { .. }) => {
            let payload = error_payload(e);
            assert_eq!(payload["terminal"], true);
        }
        other => panic!("expected ChallengeClosed, got {other:?}"),
    }
    assert_eq!(gateway.ledger().transaction_count().await, 0);
}

/// Scenario D: a suspended credential drops out of eligibility
/// regardless of priority ordering
#[tokio::test]
async fn test_suspended_credential_not_eligible() {
    let gateway = gateway();
    let user = UserId::new();

    let suspended = gateway
        .register_credential(visa_request(&user, None))
        .await
        .unwrap();
    let mut second = visa_request(&user, None);
    second.brand = "Mastercard".to_string();
    second.is_default = false;
    second.sensitive_data = serde_json::json!({ "card_number": "5555555555555678" });
    gateway.register_credential(second).await.unwrap();

    let suspended_id =
        agentpay_types::CredentialId::parse(&suspended.credential_id).unwrap();
    assert!(gateway.credentials().deactivate(&suspended_id).await);

    let methods = gateway
        .payment_methods(&user, &Amount::from_major(10.0, Currency::USD))
        .await;
    assert_eq!(methods.len(), 1);
    assert_eq!(methods[0].brand, "Mastercard");
}

/// OTP submission by a different user is rejected before any
/// verification attempt is consumed
#[tokio::test]
async fn test_foreign_user_cannot_submit_otp() {
    let gateway = gateway();
    let user = UserId::new();
    let merchant = agentpay_types::MerchantId::new();

    let credential = gateway
        .register_credential(visa_request(&user, None))
        .await
        .unwrap();
    let credential_id = agentpay_types::CredentialId::parse(&credential.credential_id).unwrap();

    let detail = gateway
        .checkout(user.clone(), cart(25.0), Currency::USD, &merchant, "Store")
        .await
        .unwrap();
    let mandate_id = MandateId::parse(detail["mandate"]["id"].as_str().unwrap()).unwrap();

    let initiation = gateway
        .initiate_payment(&mandate_id, &credential_id, &user)
        .await
        .unwrap();
    let code = initiation.demo_otp_code.unwrap();

    let result = gateway.submit_otp(&mandate_id, &code, &UserId::new()).await;
    assert!(matches!(result, Err(AgentPayError::Authorization { .. })));

    // the rightful owner can still settle
    let result = gateway.submit_otp(&mandate_id, &code, &user).await;
    assert!(result.is_ok());
}

/// Refund flow: clamped to the transaction amount, completed only
#[tokio::test]
async fn test_refund_after_settlement() {
    let gateway = gateway();
    let user = UserId::new();
    let merchant = agentpay_types::MerchantId::new();

    let credential = gateway
        .register_credential(visa_request(&user, None))
        .await
        .unwrap();
    let credential_id = agentpay_types::CredentialId::parse(&credential.credential_id).unwrap();

    let detail = gateway
        .checkout(user.clone(), cart(999.0), Currency::USD, &merchant, "Store")
        .await
        .unwrap();
    let mandate_id = MandateId::parse(detail["mandate"]["id"].as_str().unwrap()).unwrap();
    let initiation = gateway
        .initiate_payment(&mandate_id, &credential_id, &user)
        .await
        .unwrap();
    let result = gateway
        .submit_otp(&mandate_id, &initiation.demo_otp_code.unwrap(), &user)
        .await
        .unwrap();
    let transaction_id =
        TransactionId::parse(result["transaction_id"].as_str().unwrap()).unwrap();

    let refund = gateway
        .refund(
            &transaction_id,
            Amount::from_major(2000.0, Currency::USD),
            "customer request",
        )
        .await
        .unwrap();
    assert_eq!(refund["status"], "completed");
    assert_eq!(refund["amount"]["amount"], 999.0);
    assert_eq!(refund["estimated_arrival"], "3-5 business days");
}

/// Unattended path: an intent mandate settles without an OTP and stamps
/// human-not-present modality
#[tokio::test]
async fn test_unattended_charge_under_intent() {
    let gateway = gateway();
    let user = UserId::new();

    let credential = gateway
        .register_credential(visa_request(&user, None))
        .await
        .unwrap();
    let credential_id = agentpay_types::CredentialId::parse(&credential.credential_id).unwrap();

    let intent = gateway
        .create_intent_mandate(
            user.clone(),
            Amount::from_major(500.0, Currency::USD),
            vec!["electronics".to_string()],
            vec![],
            vec![credential_id.clone()],
            chrono::Duration::days(7),
        )
        .await
        .unwrap();

    let result = gateway
        .unattended_charge(
            &intent.id,
            &credential_id,
            Amount::from_major(200.0, Currency::USD),
            None,
            Some("electronics"),
        )
        .await
        .unwrap();

    assert_eq!(result["status"], "completed");
    assert_eq!(
        result["payment_mandate"]["transaction_modality"],
        "human_not_present"
    );

    // over-budget charge is refused
    let over = gateway
        .unattended_charge(
            &intent.id,
            &credential_id,
            Amount::from_major(600.0, Currency::USD),
            None,
            None,
        )
        .await;
    assert!(matches!(over, Err(AgentPayError::Validation { .. })));
}

/// Demo seeding provides the Visa/Mastercard pair with Visa default
#[tokio::test]
async fn test_demo_seeding_and_optimal_selection() {
    let gateway = gateway();
    let user = UserId::new();
    gateway.seed_demo_users(&[user.clone()]).await.unwrap();

    let amount = Amount::from_major(150.0, Currency::USD);
    let methods = gateway.payment_methods(&user, &amount).await;
    assert_eq!(methods.len(), 2);
    assert_eq!(methods[0].brand, "Visa");
    assert!(methods[0].is_default);

    let optimal = gateway.optimal_method(&user, &amount, None).await.unwrap();
    assert_eq!(optimal.brand, "Visa");

    let hinted = gateway
        .optimal_method(&user, &amount, Some("mastercard"))
        .await
        .unwrap();
    assert_eq!(hinted.brand, "Mastercard");
}

/// Housekeeping reclaims nothing on a fresh gateway
#[tokio::test]
async fn test_cleanup_on_fresh_gateway() {
    let gateway = gateway();
    let report = gateway.cleanup_expired().await;
    assert_eq!(report.mandates, 0);
    assert_eq!(report.tokens, 0);
    assert_eq!(report.challenges, 0);
}

//! AgentPay purchase-flow demo
//!
//! Runs the whole authorization flow against an in-process gateway:
//! checkout, method selection, payment initiation, a deliberately wrong
//! OTP, the correct OTP, then status and refund. Demo mode is on so the
//! issued code is visible in the initiation payload.

use agentpay_gateway::{error_payload, GatewayConfig, PaymentsGateway};
use agentpay_mandates::CartItemInput;
use agentpay_types::{Amount, Currency, MandateId, MerchantId, ProductId, TransactionId, UserId};
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn print_section(title: &str) {
    println!("\n{}", "=".repeat(50));
    println!(" {title}");
    println!("{}", "=".repeat(50));
}

fn print_payload(title: &str, payload: &serde_json::Value) {
    println!("\n{title}:");
    println!(
        "{}",
        serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string())
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut config = GatewayConfig::from_env().unwrap_or_else(|e| {
        warn!("Falling back to built-in demo configuration: {e}");
        GatewayConfig::for_tests()
    });
    config.demo_mode = true;
    let gateway = PaymentsGateway::new(config)?;

    let user = UserId::new();
    let merchant = MerchantId::new();
    gateway.seed_demo_users(&[user.clone()]).await?;

    print_section("AGENTPAY PURCHASE FLOW DEMO");

    // 1. Checkout: cart mandate, merchant-signed
    let detail = gateway
        .checkout(
            user.clone(),
            vec![CartItemInput {
                product_id: ProductId::new(),
                name: "Wireless Headphones".to_string(),
                unit_price: Amount::from_major(999.0, Currency::USD),
                quantity: 1,
            }],
            Currency::USD,
            &merchant,
            "Demo Store",
        )
        .await?;
    print_payload("Cart mandate created (merchant-signed)", &detail);
    let mandate_id = MandateId::parse(
        detail["mandate"]["id"]
            .as_str()
            .ok_or("mandate detail missing id")?,
    )?;

    // 2. Eligible payment methods
    let amount = Amount::from_major(999.0, Currency::USD);
    let methods = gateway.payment_methods(&user, &amount).await;
    print_payload("Eligible payment methods", &serde_json::to_value(&methods)?);
    let credential_id = agentpay_types::CredentialId::parse(
        &methods.first().ok_or("no eligible method")?.credential_id,
    )?;

    // 3. Initiate payment: user-signs the mandate and issues the OTP
    let initiation = gateway
        .initiate_payment(&mandate_id, &credential_id, &user)
        .await?;
    print_payload("Payment initiated", &serde_json::to_value(&initiation)?);
    let code = initiation
        .demo_otp_code
        .clone()
        .ok_or("demo mode should expose the code")?;

    // 4. A wrong code first, to show the attempt counter
    let wrong = if code == "000000" { "000001" } else { "000000" };
    if let Err(e) = gateway.submit_otp(&mandate_id, wrong, &user).await {
        print_payload("Wrong code rejected", &error_payload(&e));
    }

    // 5. The correct code settles the payment
    let result = gateway.submit_otp(&mandate_id, &code, &user).await?;
    print_payload("Payment settled", &result);
    let transaction_id = TransactionId::parse(
        result["transaction_id"]
            .as_str()
            .ok_or("settlement payload missing transaction id")?,
    )?;

    // 6. Transaction status and a partial refund
    let status = gateway.transaction_status(&transaction_id).await?;
    print_payload("Transaction status", &status);

    let refund = gateway
        .refund(
            &transaction_id,
            Amount::from_major(100.0, Currency::USD),
            "demo partial refund",
        )
        .await?;
    print_payload("Refund processed", &refund);

    print_section("DONE");
    Ok(())
}

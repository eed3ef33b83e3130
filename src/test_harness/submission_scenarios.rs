//! Scenario tests for replacement submission, organized by phase:
//!
//! - Phase 1: validation and wallet presence
//! - Phase 2: sending (forced nonce, rejection, node errors)
//! - Phase 3: confirmation (receipt polling, failed execution)
//!
//! Test naming convention:
//! - `test_s{N}_{scenario}` - single submission scenario
//! - `test_{compound_scenario}` - compound scenarios

use std::time::Duration;

use alloy::{primitives::B256, rpc::types::TransactionRequest};
use anyhow::{anyhow, ensure, Result};
use serde_json::Value;

use super::{receipt_json, ReplacementScenario};
use crate::ext::{NonceDiscrepancy, ProviderRpcError, ReplaceError, SubmissionState};

/// The single transaction the wallet was asked to send.
fn sent_transaction(scenario: &ReplacementScenario) -> Result<TransactionRequest> {
    let calls = scenario.wallet.calls_to("eth_sendTransaction");
    ensure!(calls.len() == 1, "expected one send, got {}", calls.len());
    let tx = calls[0]
        .get(0)
        .cloned()
        .ok_or_else(|| anyhow!("eth_sendTransaction called without params"))?;
    Ok(serde_json::from_value(tx)?)
}

// ============================================================================
// Phase 1: Validation
// ============================================================================

/// S1: Incomplete form
///
/// Scenario: Submit without a nonce while a wallet is connected
/// Expected: InvalidInput, and the wallet is never asked anything
#[test_log::test(tokio::test)]
async fn test_s1_invalid_input_checked_first() {
    let scenario = ReplacementScenario::new();

    println!("\n=== S1: Invalid Input ===\n");

    let mut request = scenario.request(7);
    request.nonce = None;
    let err = scenario
        .submitter()
        .submit(Some(&scenario.handle()), &request)
        .await
        .unwrap_err();

    assert!(matches!(err, ReplaceError::InvalidInput(_)), "{err}");
    assert!(scenario.wallet.calls().is_empty());

    println!("PASSED: validation runs before any wallet call\n");
}

/// S2: No wallet
///
/// Scenario: Submit a valid request with no connected wallet
/// Expected: MissingWallet, state Failed
#[test_log::test(tokio::test)]
async fn test_s2_missing_wallet() {
    let scenario = ReplacementScenario::new();
    let submitter = scenario.submitter();

    println!("\n=== S2: Missing Wallet ===\n");

    let err = submitter.submit(None, &scenario.request(7)).await.unwrap_err();

    assert_eq!(err, ReplaceError::MissingWallet);
    assert_eq!(
        submitter.state(),
        SubmissionState::Failed {
            error: ReplaceError::MissingWallet
        }
    );

    println!("PASSED: MissingWallet reported\n");
}

/// S3: Wallet has no accounts
///
/// Scenario: The wallet grants access but returns an empty account list
/// Expected: NoAccounts, nothing sent
#[test_log::test(tokio::test)]
async fn test_s3_wallet_without_accounts() {
    let scenario = ReplacementScenario::new();
    scenario
        .wallet
        .set("eth_requestAccounts", Ok(Value::Array(vec![])));

    println!("\n=== S3: No Accounts ===\n");

    let err = scenario
        .submitter()
        .submit(Some(&scenario.handle()), &scenario.request(7))
        .await
        .unwrap_err();

    assert_eq!(err, ReplaceError::NoAccounts);
    assert!(scenario.wallet.calls_to("eth_sendTransaction").is_empty());

    println!("PASSED: NoAccounts reported\n");
}

// ============================================================================
// Phase 2: Sending
// ============================================================================

/// S4: Forced nonce with discrepancy
///
/// Scenario: The wallet's signer expects nonce 9, the user replaces nonce 7
/// Expected: The sent transaction carries nonce 7 as a zero-value
///           self-transfer, and the discrepancy is reported
#[test_log::test(tokio::test)]
async fn test_s4_forced_nonce_with_discrepancy() -> Result<()> {
    let scenario = ReplacementScenario::new().wallet_nonce(9);
    let submitter = scenario.submitter();

    println!("\n=== S4: Forced Nonce ===\n");

    let receipt = submitter
        .submit(Some(&scenario.handle()), &scenario.request(7))
        .await?;

    let tx = sent_transaction(&scenario)?;
    assert_eq!(tx.nonce, Some(7));
    assert_eq!(tx.from, Some(scenario.account));
    assert_eq!(tx.to, Some(scenario.account.into()));
    assert_eq!(tx.gas_price, Some(60_000_000_000));
    assert_eq!(tx.gas, Some(21_000));
    assert_eq!(tx.chain_id, Some(1));
    assert!(tx.value.unwrap_or_default().is_zero());

    assert_eq!(receipt.nonce, 7);
    assert!(receipt.confirmed);
    assert_eq!(
        receipt.nonce_discrepancy,
        Some(NonceDiscrepancy {
            wallet_expected: 9,
            forced: 7
        })
    );
    assert!(receipt
        .message()
        .contains("Wallet expected nonce 9 but 7 was used"));
    assert!(matches!(
        submitter.state(),
        SubmissionState::Confirmed {
            nonce: 7,
            succeeded: true,
            ..
        }
    ));

    // The signer nonce is read at "latest", not "pending".
    let count_calls = scenario.wallet.calls_to("eth_getTransactionCount");
    assert_eq!(count_calls[0][1], "latest");

    println!("PASSED: nonce 7 forced over wallet's 9\n");
    Ok(())
}

/// S5: Forced nonce matching the wallet
///
/// Scenario: The wallet already expects the requested nonce
/// Expected: No discrepancy is reported
#[test_log::test(tokio::test)]
async fn test_s5_matching_nonce_has_no_discrepancy() {
    let scenario = ReplacementScenario::new().wallet_nonce(7);

    let receipt = scenario
        .submitter()
        .submit(Some(&scenario.handle()), &scenario.request(7))
        .await
        .unwrap();

    assert!(receipt.nonce_discrepancy.is_none());
    assert!(!receipt.message().contains("Wallet expected"));
}

/// S6: User rejects in the wallet
///
/// Scenario: eth_sendTransaction fails with code 4001
/// Expected: UserRejected, state Failed, and no retry
#[test_log::test(tokio::test)]
async fn test_s6_user_rejection_is_not_retried() {
    let scenario = ReplacementScenario::new().wallet_nonce(7);
    scenario.wallet.set(
        "eth_sendTransaction",
        Err(ProviderRpcError::new(4001, "User denied transaction signature.")),
    );
    let submitter = scenario.submitter();

    println!("\n=== S6: User Rejection ===\n");

    let err = submitter
        .submit(Some(&scenario.handle()), &scenario.request(7))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ReplaceError::UserRejected("User denied transaction signature.".into())
    );
    assert!(matches!(submitter.state(), SubmissionState::Failed { .. }));
    assert_eq!(scenario.wallet.calls_to("eth_sendTransaction").len(), 1);
    assert!(scenario
        .wallet
        .calls_to("eth_getTransactionReceipt")
        .is_empty());

    println!("PASSED: rejection surfaced once\n");
}

/// S7: Replacement underpriced
///
/// Scenario: The node refuses the replacement as underpriced
/// Expected: SubmissionError carrying the node message and a hint
#[test_log::test(tokio::test)]
async fn test_s7_underpriced_gets_hint() {
    let scenario = ReplacementScenario::new().wallet_nonce(7);
    scenario.wallet.set(
        "eth_sendTransaction",
        Err(ProviderRpcError::new(
            -32000,
            "replacement transaction underpriced",
        )),
    );

    let err = scenario
        .submitter()
        .submit(Some(&scenario.handle()), &scenario.request(7))
        .await
        .unwrap_err();

    let ReplaceError::SubmissionError(message) = err else {
        panic!("expected SubmissionError, got {err:?}");
    };
    assert!(message.contains("replacement transaction underpriced"));
    assert!(
        message.len() > "replacement transaction underpriced".len(),
        "hint missing: {message}"
    );
}

/// S8: Chain id unavailable
///
/// Scenario: eth_chainId fails
/// Expected: The replacement is still sent, without a chain id or explorer link
#[test_log::test(tokio::test)]
async fn test_s8_chain_id_unavailable() -> Result<()> {
    let scenario = ReplacementScenario::new().wallet_nonce(7);
    scenario.wallet.set(
        "eth_chainId",
        Err(ProviderRpcError::new(-32603, "internal error")),
    );

    let receipt = scenario
        .submitter()
        .submit(Some(&scenario.handle()), &scenario.request(7))
        .await?;

    assert_eq!(sent_transaction(&scenario)?.chain_id, None);
    assert_eq!(receipt.chain_id, None);
    assert!(receipt.explorer_url.is_none());
    Ok(())
}

/// S9: Explorer links
///
/// Scenario: Submit on mainnet, then on a chain without a known explorer
/// Expected: An etherscan link on mainnet, none on the local chain
#[test_log::test(tokio::test)]
async fn test_s9_explorer_url_by_chain() {
    let mainnet = ReplacementScenario::new().wallet_nonce(7);
    let receipt = mainnet
        .submitter()
        .submit(Some(&mainnet.handle()), &mainnet.request(7))
        .await
        .unwrap();
    let hash = B256::repeat_byte(0xee);
    assert_eq!(
        receipt.explorer_url.as_deref(),
        Some(format!("https://etherscan.io/tx/{hash}").as_str())
    );

    let local = ReplacementScenario::new().wallet_nonce(7).chain(31337);
    let receipt = local
        .submitter()
        .submit(Some(&local.handle()), &local.request(7))
        .await
        .unwrap();
    assert_eq!(receipt.chain_id, Some(31337));
    assert!(receipt.explorer_url.is_none());
}

// ============================================================================
// Phase 3: Confirmation
// ============================================================================

/// S10: Receipt not yet available
///
/// Scenario: The first two receipt polls return null
/// Expected: The submitter keeps polling at the configured interval and
///           reports Confirmed once the receipt appears
#[test_log::test(tokio::test(start_paused = true))]
async fn test_s10_receipt_polling() {
    let scenario = ReplacementScenario::new()
        .wallet_nonce(7)
        .config(|c| c.with_confirmation_poll_interval(Duration::from_secs(4)));
    scenario
        .wallet
        .push_once("eth_getTransactionReceipt", Ok(Value::Null));
    scenario
        .wallet
        .push_once("eth_getTransactionReceipt", Ok(Value::Null));
    let submitter = scenario.submitter();

    println!("\n=== S10: Receipt Polling ===\n");

    let started = tokio::time::Instant::now();
    let receipt = submitter
        .submit(Some(&scenario.handle()), &scenario.request(7))
        .await
        .unwrap();

    assert!(receipt.confirmed);
    assert_eq!(scenario.wallet.calls_to("eth_getTransactionReceipt").len(), 3);
    assert!(started.elapsed() >= Duration::from_secs(8));
    assert!(matches!(
        submitter.state(),
        SubmissionState::Confirmed {
            block_number: Some(16),
            ..
        }
    ));

    println!("PASSED: confirmed after two empty polls\n");
}

/// S11: Replacement mined but failed
///
/// Scenario: The receipt carries status 0
/// Expected: Confirmed with succeeded = false
#[test_log::test(tokio::test)]
async fn test_s11_mined_with_failed_status() {
    let scenario = ReplacementScenario::new().wallet_nonce(7);
    scenario.wallet.set(
        "eth_getTransactionReceipt",
        Ok(receipt_json(B256::repeat_byte(0xee), 0)),
    );
    let submitter = scenario.submitter();

    let receipt = submitter
        .submit(Some(&scenario.handle()), &scenario.request(7))
        .await
        .unwrap();

    assert!(receipt.confirmed);
    assert!(matches!(
        submitter.state(),
        SubmissionState::Confirmed {
            succeeded: false,
            ..
        }
    ));
}

// ============================================================================
// Compound Scenarios
// ============================================================================

/// Scenario: A second submit arrives while the first waits on the wallet
/// Expected: The second is refused with SubmissionInProgress; once the first
///           completes, submitting works again
#[test_log::test(tokio::test)]
async fn test_concurrent_submit_is_refused() {
    let scenario = ReplacementScenario::new().wallet_nonce(7);
    let submitter = scenario.submitter();
    let gate = scenario.wallet.gate("eth_sendTransaction");

    println!("\n=== Concurrent Submit ===\n");

    let first = {
        let submitter = submitter.clone();
        let handle = scenario.handle();
        let request = scenario.request(7);
        tokio::spawn(async move { submitter.submit(Some(&handle), &request).await })
    };
    while scenario.wallet.calls_to("eth_sendTransaction").is_empty() {
        tokio::task::yield_now().await;
    }
    assert_eq!(submitter.state(), SubmissionState::Submitting);
    assert!(submitter.state().is_busy());

    let err = submitter
        .submit(Some(&scenario.handle()), &scenario.request(7))
        .await
        .unwrap_err();
    assert_eq!(err, ReplaceError::SubmissionInProgress);

    gate.notify_one();
    first.await.unwrap().unwrap();
    assert!(!submitter.state().is_busy());

    submitter
        .submit(Some(&scenario.handle()), &scenario.request(7))
        .await
        .unwrap();
    assert_eq!(scenario.wallet.calls_to("eth_sendTransaction").len(), 2);

    println!("PASSED: one submission at a time\n");
}

/// Scenario: Observe the state machine through a subscription
/// Expected: The final published state is Confirmed for the sent hash
#[test_log::test(tokio::test)]
async fn test_state_subscription_sees_confirmation() {
    let scenario = ReplacementScenario::new().wallet_nonce(7);
    let submitter = scenario.submitter();
    let mut states = submitter.subscribe();
    assert_eq!(*states.borrow(), SubmissionState::Idle);

    let receipt = submitter
        .submit(Some(&scenario.handle()), &scenario.request(7))
        .await
        .unwrap();

    assert!(states.has_changed().unwrap());
    let latest = states.borrow_and_update().clone();
    match latest {
        SubmissionState::Confirmed { hash, nonce, .. } => {
            assert_eq!(hash, receipt.hash);
            assert_eq!(nonce, 7);
        }
        other => panic!("unexpected state {other:?}"),
    }
    assert_ne!(receipt.hash, B256::ZERO);
}

//! Integration tests for the retrying, paginated directory client.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use adlink_core::error::{DirectoryError, ErrorCategory};
use adlink_core::retry::RetryPolicy;
use adlink_core::types::{AttributeChange, RawEntry, Scope};
use adlink_ldap::client::{DirectoryClient, SearchOutcome, MAX_PAGES};
use adlink_ldap::config::ClientConfig;

use helpers::FakeDirectory;

const BASE: &str = "DC=example,DC=com";

fn fast_config() -> ClientConfig {
    ClientConfig::new(BASE).with_retry(RetryPolicy {
        initial_backoff: Duration::from_millis(1),
        backoff_factor: 2.0,
        max_backoff: Duration::from_millis(8),
        max_retries: 3,
    })
}

fn client_over(directory: &Arc<FakeDirectory>) -> DirectoryClient {
    DirectoryClient::new(directory.clone(), fast_config()).unwrap()
}

fn plain_user(n: usize) -> RawEntry {
    let mut entry = RawEntry::new(format!("CN=user{n},OU=Users,{BASE}"));
    entry
        .attrs
        .insert("objectClass".to_string(), vec!["user".to_string()]);
    entry
}

#[tokio::test]
async fn test_paginated_search_walks_every_page() {
    let directory = FakeDirectory::new(BASE);
    for n in 0..2500 {
        directory.add_entry(plain_user(n));
    }
    let client = client_over(&directory);
    let cancel = CancellationToken::new();

    let result = client
        .search_paged(BASE, "(objectClass=user)", &["cn"], &cancel)
        .await
        .unwrap();

    assert_eq!(result.outcome, SearchOutcome::Complete);
    assert!(result.is_complete());
    assert_eq!(result.entries.len(), 2500);
    assert_eq!(result.pages, 3);
}

#[tokio::test]
async fn test_pagination_stops_at_the_page_ceiling() {
    let directory = FakeDirectory::new(BASE);
    directory.set_endless_pages(true);
    let client = client_over(&directory);
    let cancel = CancellationToken::new();

    let result = client
        .search_paged(BASE, "(objectClass=user)", &["cn"], &cancel)
        .await
        .unwrap();

    assert_eq!(result.outcome, SearchOutcome::PageCeilingReached);
    assert_eq!(result.pages, MAX_PAGES);
    assert_eq!(result.entries.len(), MAX_PAGES as usize);
}

#[tokio::test]
async fn test_exhausted_time_budget_returns_what_was_gathered() {
    let directory = FakeDirectory::new(BASE);
    directory.set_endless_pages(true);
    let client = client_over(&directory);
    let cancel = CancellationToken::new();

    let result = client
        .search_paged_with_budget(
            BASE,
            "(objectClass=user)",
            &["cn"],
            Duration::ZERO,
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(result.outcome, SearchOutcome::TimeCeilingReached);
    assert_eq!(result.pages, 0);
}

#[tokio::test]
async fn test_cancelled_search_is_not_an_error() {
    let directory = FakeDirectory::new(BASE);
    directory.add_entry(plain_user(1));
    let client = client_over(&directory);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = client
        .search_paged(BASE, "(objectClass=user)", &["cn"], &cancel)
        .await
        .unwrap();

    assert_eq!(result.outcome, SearchOutcome::Cancelled);
    assert!(result.entries.is_empty());
}

#[tokio::test]
async fn test_transient_failure_is_retried_to_success() {
    let directory = FakeDirectory::new(BASE);
    directory.add_entry(plain_user(1));
    directory.queue_error(DirectoryError::connection_failed("search", "reset by peer"));
    let client = client_over(&directory);
    let cancel = CancellationToken::new();

    let page = client
        .search_single(BASE, Scope::Subtree, "(objectClass=user)", &["cn"], 0, &cancel)
        .await
        .unwrap();

    assert_eq!(page.entries.len(), 1);
    assert_eq!(directory.search_count(), 2);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let directory = FakeDirectory::new(BASE);
    directory.queue_error(DirectoryError::authentication("bind", "invalid credentials"));
    let client = client_over(&directory);
    let cancel = CancellationToken::new();

    let err = client
        .search_single(BASE, Scope::Subtree, "(objectClass=user)", &["cn"], 0, &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::Authentication);
    assert_eq!(directory.search_count(), 1);
}

#[tokio::test]
async fn test_retry_budget_exhaustion_is_terminal() {
    let directory = FakeDirectory::new(BASE);
    for _ in 0..4 {
        directory.queue_error(DirectoryError::server("search", "busy", true));
    }
    let client = client_over(&directory);
    let cancel = CancellationToken::new();

    let err = client
        .search_single(BASE, Scope::Subtree, "(objectClass=user)", &["cn"], 0, &cancel)
        .await
        .unwrap_err();

    assert!(!err.is_retryable());
    assert!(err.message.contains("retries exhausted"));
    assert_eq!(directory.search_count(), 4);
}

#[tokio::test]
async fn test_single_page_flags_a_possibly_truncated_result() {
    let directory = FakeDirectory::new(BASE);
    for n in 0..5 {
        directory.add_entry(plain_user(n));
    }
    let client = client_over(&directory);
    let cancel = CancellationToken::new();

    let page = client
        .search_single(BASE, Scope::Subtree, "(objectClass=user)", &["cn"], 3, &cancel)
        .await
        .unwrap();
    assert_eq!(page.entries.len(), 3);
    assert!(page.has_more);

    let page = client
        .search_single(BASE, Scope::Subtree, "(objectClass=user)", &["cn"], 0, &cancel)
        .await
        .unwrap();
    assert_eq!(page.entries.len(), 5);
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_default_naming_context_from_root_dse() {
    let directory = FakeDirectory::new(BASE);
    let client = client_over(&directory);
    let cancel = CancellationToken::new();

    let context = client.default_naming_context(&cancel).await.unwrap();
    assert_eq!(context, BASE);
}

#[tokio::test]
async fn test_write_operations_round_trip() {
    let directory = FakeDirectory::new(BASE);
    let client = client_over(&directory);
    let cancel = CancellationToken::new();

    let dn = format!("CN=New User,OU=Users,{BASE}");
    client
        .add(
            &dn,
            &[
                ("objectClass".to_string(), vec!["user".to_string()]),
                ("cn".to_string(), vec!["New User".to_string()]),
            ],
            &cancel,
        )
        .await
        .unwrap();

    client
        .modify(
            &dn,
            &[AttributeChange::Replace {
                attribute: "mail".to_string(),
                values: vec!["new.user@example.com".to_string()],
            }],
            &cancel,
        )
        .await
        .unwrap();

    let page = client
        .search_single(BASE, Scope::Subtree, "(cn=New User)", &[], 0, &cancel)
        .await
        .unwrap();
    assert_eq!(page.entries.len(), 1);
    assert_eq!(
        page.entries[0].attr_first("mail"),
        Some("new.user@example.com")
    );

    client.delete(&dn, &cancel).await.unwrap();
    let err = client.delete(&dn, &cancel).await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::NotFound);
    assert_eq!(err.dn.as_deref(), Some(dn.as_str()));
}

#[tokio::test]
async fn test_rename_moves_the_entry() {
    let directory = FakeDirectory::new(BASE);
    directory.add_entry(plain_user(7));
    let client = client_over(&directory);
    let cancel = CancellationToken::new();

    let dn = format!("CN=user7,OU=Users,{BASE}");
    client
        .rename(&dn, "CN=renamed7", Some(&format!("OU=Staff,{BASE}")), &cancel)
        .await
        .unwrap();

    let page = client
        .search_single(BASE, Scope::Subtree, "(objectClass=user)", &[], 0, &cancel)
        .await
        .unwrap();
    assert_eq!(page.entries[0].dn, format!("CN=renamed7,OU=Staff,{BASE}"));
}

#[tokio::test]
async fn test_whoami() {
    let directory = FakeDirectory::new(BASE);
    let client = client_over(&directory);
    let cancel = CancellationToken::new();

    let identity = client.whoami(&cancel).await.unwrap();
    assert!(identity.contains("svc-adlink"));
}

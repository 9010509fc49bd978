//! Integration tests for the structured search path
//!
//! These tests verify the behavior the answer pipeline depends on:
//! - per-item-per-year price aggregates over both item sources
//! - supplier ranking by win count with the lower-average-price tie-break
//! - lookback window filtering
//! - source attribution surviving the merge
//! - missing price/spec fields never failing a query

use anyhow::Result;
use chrono::{Datelike, TimeZone, Utc};
use std::time::Duration;
use tempfile::tempdir;
use tender_ai_retriever::retrieval::structured::{
    StructuredSearchConfig, StructuredSearcher,
};
use tender_ai_retriever::retrieval::types::StructuredSource;
use tender_ai_retriever::storage::tender_store::TenderStore;
use tender_ai_retriever::storage::{AwardItem, PlanItem, TenderRecord};

fn award(
    item: &str,
    supplier: Option<&str>,
    price: Option<f64>,
    year: i32,
) -> AwardItem {
    AwardItem {
        id: None,
        tender_id: Some("T-1".to_string()),
        item_name: item.to_string(),
        supplier: supplier.map(str::to_string),
        unit_price: price,
        quantity: Some(10.0),
        currency: Some("KZT".to_string()),
        unit: Some("piece".to_string()),
        awarded_at: Utc
            .with_ymd_and_hms(year, 6, 15, 12, 0, 0)
            .single()
            .expect("valid seed date"),
    }
}

fn plan(item: &str, spec: Option<&str>, price: Option<f64>, year: i32) -> PlanItem {
    PlanItem {
        id: None,
        tender_id: Some("T-2".to_string()),
        item_name: item.to_string(),
        specification: spec.map(str::to_string),
        estimated_price: price,
        planned_year: year,
        unit: Some("piece".to_string()),
        currency: Some("KZT".to_string()),
    }
}

/// Wide lookback so seeded historical years always fall inside the window.
fn wide_config() -> StructuredSearchConfig {
    StructuredSearchConfig {
        lookback_years: 10,
        ..Default::default()
    }
}

async fn open_store() -> Result<(tempfile::TempDir, TenderStore)> {
    let dir = tempdir()?;
    let store = TenderStore::open(&dir.path().join("tender-ai.db")).await?;
    Ok((dir, store))
}

#[tokio::test]
async fn price_aggregates_cover_each_seeded_year() -> Result<()> {
    let (_dir, store) = open_store().await?;
    store
        .insert_award_item(&award("surgical drapes", Some("MedSupply"), Some(150.0), 2024))
        .await?;
    store
        .insert_award_item(&award("surgical drapes", Some("MedSupply"), Some(165.0), 2023))
        .await?;

    let searcher = StructuredSearcher::new(store, wide_config());
    let findings = searcher
        .search_item_level(&["surgical drapes".to_string()])
        .await?;

    assert!(findings.dropped_sources.is_empty());
    let aggregates: Vec<_> = findings
        .results
        .iter()
        .filter(|hit| hit.citation.contains("aggregate"))
        .collect();
    assert_eq!(aggregates.len(), 2, "one aggregate per seeded year");
    assert!(aggregates.iter().any(|hit| hit.text.contains("2024") && hit.text.contains("150.00")));
    assert!(aggregates.iter().any(|hit| hit.text.contains("2023") && hit.text.contains("165.00")));
    Ok(())
}

#[tokio::test]
async fn supplier_ranking_breaks_win_ties_by_lower_price() -> Result<()> {
    let (_dir, store) = open_store().await?;
    let this_year = Utc::now().year();
    // Both suppliers win twice; Cheaper must outrank Expensive.
    for price in [100.0, 110.0] {
        store
            .insert_award_item(&award("gloves", Some("Cheaper"), Some(price), this_year))
            .await?;
    }
    for price in [200.0, 210.0] {
        store
            .insert_award_item(&award("gloves", Some("Expensive"), Some(price), this_year))
            .await?;
    }
    // A single win never outranks two.
    store
        .insert_award_item(&award("gloves", Some("OneWin"), Some(10.0), this_year))
        .await?;

    let searcher = StructuredSearcher::new(store, wide_config());
    let findings = searcher.search_item_level(&["gloves".to_string()]).await?;

    let ranking: Vec<_> = findings
        .results
        .iter()
        .filter(|hit| hit.citation.contains("supplier ranking"))
        .collect();
    assert!(ranking.len() >= 3);
    assert!(ranking[0].text.contains("Cheaper"));
    assert!(ranking[1].text.contains("Expensive"));
    assert!(ranking[2].text.contains("OneWin"));
    Ok(())
}

#[tokio::test]
async fn merge_preserves_attribution_from_both_sources() -> Result<()> {
    let (_dir, store) = open_store().await?;
    let this_year = Utc::now().year();
    store
        .insert_award_item(&award("reagent kit", Some("LabCo"), Some(75.0), this_year))
        .await?;
    store
        .insert_plan_item(&plan(
            "reagent kit",
            Some("PCR reagent kit, 96 reactions"),
            Some(80.0),
            this_year,
        ))
        .await?;

    let searcher = StructuredSearcher::new(store, wide_config());
    let findings = searcher
        .search_item_level(&["reagent kit".to_string()])
        .await?;

    assert!(findings
        .results
        .iter()
        .any(|hit| hit.source == StructuredSource::AwardItems));
    assert!(findings
        .results
        .iter()
        .any(|hit| hit.source == StructuredSource::PlanItems));
    Ok(())
}

#[tokio::test]
async fn lookback_window_excludes_old_awards() -> Result<()> {
    let (_dir, store) = open_store().await?;
    let this_year = Utc::now().year();
    store
        .insert_award_item(&award("bandages", Some("Old"), Some(5.0), this_year - 8))
        .await?;
    store
        .insert_award_item(&award("bandages", Some("New"), Some(6.0), this_year))
        .await?;

    let config = StructuredSearchConfig {
        lookback_years: 3,
        ..Default::default()
    };
    let searcher = StructuredSearcher::new(store, config);
    let findings = searcher.search_item_level(&["bandages".to_string()]).await?;

    let aggregates: Vec<_> = findings
        .results
        .iter()
        .filter(|hit| hit.citation.contains("aggregate"))
        .collect();
    assert_eq!(aggregates.len(), 1);
    assert!(aggregates[0].text.contains(&this_year.to_string()));
    Ok(())
}

#[tokio::test]
async fn rows_with_missing_fields_do_not_fail_search() -> Result<()> {
    let (_dir, store) = open_store().await?;
    let this_year = Utc::now().year();
    // No supplier, no price: keyword search must still surface the row;
    // aggregates and rankings must simply skip it.
    store
        .insert_award_item(&award("catheters", None, None, this_year))
        .await?;
    store
        .insert_plan_item(&plan("catheters", None, None, this_year))
        .await?;

    let searcher = StructuredSearcher::new(store, wide_config());
    let findings = searcher.search_item_level(&["catheters".to_string()]).await?;

    assert!(findings.dropped_sources.is_empty());
    let keyword_hits = findings
        .results
        .iter()
        .filter(|hit| hit.citation.contains('#'))
        .count();
    assert_eq!(keyword_hits, 2, "one keyword row per source");
    assert!(!findings
        .results
        .iter()
        .any(|hit| hit.citation.contains("aggregate")));
    Ok(())
}

#[tokio::test]
async fn tender_level_search_matches_title_and_description() -> Result<()> {
    let (_dir, store) = open_store().await?;
    store
        .upsert_tender(&TenderRecord {
            id: "T-900".to_string(),
            title: "Supply of laboratory reagents".to_string(),
            description: Some("Annual reagent supply for the regional hospital".to_string()),
            buyer: Some("Regional Hospital".to_string()),
            published_at: Utc::now() - chrono::Duration::days(30),
        })
        .await?;
    store
        .upsert_tender(&TenderRecord {
            id: "T-901".to_string(),
            title: "Road construction".to_string(),
            description: None,
            buyer: None,
            published_at: Utc::now() - chrono::Duration::days(30),
        })
        .await?;

    let searcher = StructuredSearcher::new(store, wide_config());
    let findings = searcher
        .search_tender_level(&["reagent".to_string()])
        .await?;

    assert_eq!(findings.results.len(), 1);
    assert_eq!(findings.results[0].source, StructuredSource::Tenders);
    assert!(findings.results[0].text.contains("T-900"));
    Ok(())
}

#[tokio::test]
#[tracing_test::traced_test]
async fn a_source_over_budget_is_dropped_not_fatal() -> Result<()> {
    let (_dir, store) = open_store().await?;
    let this_year = Utc::now().year();
    store
        .insert_award_item(&award("thermometers", Some("MedCo"), Some(20.0), this_year))
        .await?;

    // A zero budget forces every source over it: the search must still
    // return cleanly, reporting the drops instead of erroring.
    let config = StructuredSearchConfig {
        per_source_budget: Duration::from_millis(0),
        ..Default::default()
    };
    let searcher = StructuredSearcher::new(store.clone(), config);
    let findings = searcher
        .search_item_level(&["thermometers".to_string()])
        .await?;
    assert!(findings.results.is_empty());
    // The plan-supplier no-op can finish inside even a zero budget; every
    // source that actually touches the database must have been dropped.
    assert!(findings.dropped_sources.len() >= 5);
    assert!(logs_contain("exceeded time budget"));

    // With a sane budget the same store answers normally.
    let searcher = StructuredSearcher::new(store, wide_config());
    let findings = searcher
        .search_item_level(&["thermometers".to_string()])
        .await?;
    assert!(!findings.results.is_empty());
    assert!(findings.dropped_sources.is_empty());
    Ok(())
}

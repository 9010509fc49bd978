//! Keyword and aggregate search over the structured item tables.
//!
//! Item-level questions ("price for X", "who supplies Y") are usually
//! answered better by the extracted tables than by prose chunks, so this
//! searcher fans out over both item sources at once:
//!
//! - keyword row matches in `award_items` and `plan_items` (bounded to
//!   `row_limit` rows each);
//! - per-item-per-year price aggregates (avg/min/max/count) over a
//!   configurable lookback window;
//! - top-N suppliers by win count, ties broken by lower average price
//!   (plan rows carry no supplier, so that sub-query is empty by
//!   construction but still participates in the fan-out budget).
//!
//! Tender-level questions get a single keyword search over tender
//! titles/descriptions with the same lookback window.
//!
//! Every sub-query runs under a per-source time budget; a source that
//! exceeds it is dropped with a warning instead of failing the call, so a
//! slow table can only shrink the answer, never break it.

use anyhow::Result;
use chrono::{Datelike, TimeZone, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use sqlx::Row;
use std::time::Duration;

use super::types::{AggregateStat, StructuredResult, StructuredSource, SupplierRank};
use crate::storage::tender_store::TenderStore;

/// Relevance assigned to raw keyword row hits.
const SCORE_KEYWORD_HIT: f32 = 0.7;
/// Relevance assigned to computed aggregates and rankings, which answer
/// price/supplier questions directly.
const SCORE_COMPUTED_FACT: f32 = 0.85;

/// Tunables for the structured fan-out.
#[derive(Debug, Clone)]
pub struct StructuredSearchConfig {
    /// Maximum rows per keyword sub-query.
    pub row_limit: usize,
    /// Years of history included in aggregates and tender search.
    pub lookback_years: i32,
    /// Suppliers returned by the ranking sub-queries.
    pub supplier_top_n: usize,
    /// Time budget per sub-query; slower sources are dropped.
    pub per_source_budget: Duration,
}

impl Default for StructuredSearchConfig {
    fn default() -> Self {
        Self {
            row_limit: 100,
            lookback_years: 3,
            supplier_top_n: 5,
            per_source_budget: Duration::from_millis(1500),
        }
    }
}

/// Merged output of one structured search.
#[derive(Debug, Clone, Default)]
pub struct StructuredFindings {
    /// Hits from all surviving sources, attribution preserved.
    pub results: Vec<StructuredResult>,
    /// Names of sub-queries dropped for exceeding the time budget or
    /// erroring.
    pub dropped_sources: Vec<&'static str>,
}

/// Concurrent bounded search across the two item tables and the tender
/// table.
#[derive(Clone, Debug)]
pub struct StructuredSearcher {
    store: TenderStore,
    config: StructuredSearchConfig,
}

impl StructuredSearcher {
    pub fn new(store: TenderStore, config: StructuredSearchConfig) -> Self {
        Self { store, config }
    }

    /// Fan out the six item-level sub-queries concurrently and merge
    /// whatever completes within the per-source budget.
    pub async fn search_item_level(&self, keywords: &[String]) -> Result<StructuredFindings> {
        if keywords.is_empty() {
            return Ok(StructuredFindings::default());
        }

        let subqueries: Vec<(&'static str, BoxFuture<'_, Result<Vec<StructuredResult>>>)> = vec![
            ("award_items keyword", self.award_keyword_hits(keywords).boxed()),
            ("plan_items keyword", self.plan_keyword_hits(keywords).boxed()),
            ("award_items aggregates", self.award_aggregates(keywords).boxed()),
            ("plan_items aggregates", self.plan_aggregates(keywords).boxed()),
            ("award_items suppliers", self.award_supplier_ranks(keywords).boxed()),
            ("plan_items suppliers", self.plan_supplier_ranks().boxed()),
        ];

        self.run_fan_out(subqueries).await
    }

    /// Single keyword search over tender titles and descriptions, run under
    /// the same budget discipline as the item-level fan-out.
    pub async fn search_tender_level(&self, keywords: &[String]) -> Result<StructuredFindings> {
        if keywords.is_empty() {
            return Ok(StructuredFindings::default());
        }

        let subqueries: Vec<(&'static str, BoxFuture<'_, Result<Vec<StructuredResult>>>)> =
            vec![("tenders keyword", self.tender_keyword_hits(keywords).boxed())];

        self.run_fan_out(subqueries).await
    }

    async fn run_fan_out(
        &self,
        subqueries: Vec<(&'static str, BoxFuture<'_, Result<Vec<StructuredResult>>>)>,
    ) -> Result<StructuredFindings> {
        let budget = self.config.per_source_budget;
        let outcomes = futures::future::join_all(subqueries.into_iter().map(
            |(name, query)| async move { (name, run_bounded(name, budget, query).await) },
        ))
        .await;

        let mut findings = StructuredFindings::default();
        for (name, outcome) in outcomes {
            match outcome {
                Some(results) => findings.results.extend(results),
                None => findings.dropped_sources.push(name),
            }
        }
        tracing::debug!(
            results = findings.results.len(),
            dropped = findings.dropped_sources.len(),
            "structured search merged"
        );
        Ok(findings)
    }

    async fn award_keyword_hits(&self, keywords: &[String]) -> Result<Vec<StructuredResult>> {
        let condition = like_disjunction("item_name", keywords.len());
        let sql = format!(
            "SELECT id, tender_id, item_name, supplier, unit_price, quantity,
                    currency, unit, awarded_at
             FROM award_items
             WHERE {condition}
             ORDER BY awarded_at DESC
             LIMIT ?"
        );

        let mut query = sqlx::query(&sql);
        for keyword in keywords {
            query = query.bind(like_pattern(keyword));
        }
        query = query.bind(self.config.row_limit as i64);

        let rows = query.fetch_all(self.store.pool()).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let id: i64 = row.get("id");
                let tender_id: Option<String> = row.get("tender_id");
                let item_name: String = row.get("item_name");
                let supplier: Option<String> = row.get("supplier");
                let unit_price: Option<f64> = row.get("unit_price");
                let currency: Option<String> = row.get("currency");
                let unit: Option<String> = row.get("unit");
                let awarded_at = row.get("awarded_at");

                let mut text = format!("Awarded: {item_name}");
                if let Some(supplier) = &supplier {
                    text.push_str(&format!(" — supplier {supplier}"));
                }
                if let Some(price) = unit_price {
                    text.push_str(&format!(
                        ", unit price {price:.2} {}",
                        currency.as_deref().unwrap_or("")
                    ));
                    if let Some(unit) = &unit {
                        text.push_str(&format!(" per {unit}"));
                    }
                }

                StructuredResult {
                    source: StructuredSource::AwardItems,
                    row_id: Some(id),
                    text,
                    score: SCORE_KEYWORD_HIT,
                    effective_at: awarded_at,
                    citation: citation("award_items", id, tender_id.as_deref()),
                }
            })
            .collect())
    }

    async fn plan_keyword_hits(&self, keywords: &[String]) -> Result<Vec<StructuredResult>> {
        // Plan rows match on the item name or the free-text specification.
        let name_condition = like_disjunction("item_name", keywords.len());
        let spec_condition = like_disjunction("specification", keywords.len());
        let sql = format!(
            "SELECT id, tender_id, item_name, specification, estimated_price,
                    planned_year, unit, currency
             FROM plan_items
             WHERE ({name_condition}) OR ({spec_condition})
             ORDER BY planned_year DESC
             LIMIT ?"
        );

        let mut query = sqlx::query(&sql);
        for keyword in keywords {
            query = query.bind(like_pattern(keyword));
        }
        for keyword in keywords {
            query = query.bind(like_pattern(keyword));
        }
        query = query.bind(self.config.row_limit as i64);

        let rows = query.fetch_all(self.store.pool()).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let id: i64 = row.get("id");
                let tender_id: Option<String> = row.get("tender_id");
                let item_name: String = row.get("item_name");
                let specification: Option<String> = row.get("specification");
                let estimated_price: Option<f64> = row.get("estimated_price");
                let planned_year: i64 = row.get("planned_year");
                let currency: Option<String> = row.get("currency");

                let mut text = format!("Planned ({planned_year}): {item_name}");
                if let Some(spec) = &specification {
                    text.push_str(&format!(" — {spec}"));
                }
                if let Some(price) = estimated_price {
                    text.push_str(&format!(
                        ", estimated price {price:.2} {}",
                        currency.as_deref().unwrap_or("")
                    ));
                }

                StructuredResult {
                    source: StructuredSource::PlanItems,
                    row_id: Some(id),
                    text,
                    score: SCORE_KEYWORD_HIT,
                    effective_at: year_start(planned_year as i32),
                    citation: citation("plan_items", id, tender_id.as_deref()),
                }
            })
            .collect())
    }

    async fn award_aggregates(&self, keywords: &[String]) -> Result<Vec<StructuredResult>> {
        let condition = like_disjunction("item_name", keywords.len());
        let cutoff = Utc::now() - chrono::Duration::days(365 * self.config.lookback_years as i64);
        let sql = format!(
            "SELECT item_name,
                    CAST(strftime('%Y', awarded_at) AS INTEGER) AS year,
                    AVG(unit_price) AS avg_price,
                    MIN(unit_price) AS min_price,
                    MAX(unit_price) AS max_price,
                    COUNT(unit_price) AS sample_count,
                    MAX(currency) AS currency,
                    MAX(unit) AS unit
             FROM award_items
             WHERE unit_price IS NOT NULL
               AND awarded_at >= ?
               AND ({condition})
             GROUP BY item_name, year
             ORDER BY year DESC, item_name
             LIMIT ?"
        );

        let mut query = sqlx::query(&sql).bind(cutoff);
        for keyword in keywords {
            query = query.bind(like_pattern(keyword));
        }
        query = query.bind(self.config.row_limit as i64);

        let rows = query.fetch_all(self.store.pool()).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let stat = AggregateStat {
                    item_name: row.get("item_name"),
                    year: row.get::<i64, _>("year") as i32,
                    avg_price: row.get("avg_price"),
                    min_price: row.get("min_price"),
                    max_price: row.get("max_price"),
                    sample_count: row.get("sample_count"),
                    currency: row.get("currency"),
                    unit: row.get("unit"),
                    source: StructuredSource::AwardItems,
                };
                aggregate_result(stat)
            })
            .collect())
    }

    async fn plan_aggregates(&self, keywords: &[String]) -> Result<Vec<StructuredResult>> {
        let condition = like_disjunction("item_name", keywords.len());
        let first_year = Utc::now().year() - (self.config.lookback_years - 1);
        let sql = format!(
            "SELECT item_name,
                    planned_year AS year,
                    AVG(estimated_price) AS avg_price,
                    MIN(estimated_price) AS min_price,
                    MAX(estimated_price) AS max_price,
                    COUNT(estimated_price) AS sample_count,
                    MAX(currency) AS currency,
                    MAX(unit) AS unit
             FROM plan_items
             WHERE estimated_price IS NOT NULL
               AND planned_year >= ?
               AND ({condition})
             GROUP BY item_name, planned_year
             ORDER BY planned_year DESC, item_name
             LIMIT ?"
        );

        let mut query = sqlx::query(&sql).bind(first_year as i64);
        for keyword in keywords {
            query = query.bind(like_pattern(keyword));
        }
        query = query.bind(self.config.row_limit as i64);

        let rows = query.fetch_all(self.store.pool()).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let stat = AggregateStat {
                    item_name: row.get("item_name"),
                    year: row.get::<i64, _>("year") as i32,
                    avg_price: row.get("avg_price"),
                    min_price: row.get("min_price"),
                    max_price: row.get("max_price"),
                    sample_count: row.get("sample_count"),
                    currency: row.get("currency"),
                    unit: row.get("unit"),
                    source: StructuredSource::PlanItems,
                };
                aggregate_result(stat)
            })
            .collect())
    }

    async fn award_supplier_ranks(&self, keywords: &[String]) -> Result<Vec<StructuredResult>> {
        let condition = like_disjunction("item_name", keywords.len());
        let cutoff = Utc::now() - chrono::Duration::days(365 * self.config.lookback_years as i64);
        // Ties on win count go to the cheaper supplier; suppliers with no
        // priced rows sort last among equals.
        let sql = format!(
            "SELECT supplier,
                    COUNT(*) AS win_count,
                    AVG(unit_price) AS avg_price,
                    SUM(unit_price * COALESCE(quantity, 1)) AS total_value
             FROM award_items
             WHERE supplier IS NOT NULL
               AND awarded_at >= ?
               AND ({condition})
             GROUP BY supplier
             ORDER BY win_count DESC, (avg_price IS NULL), avg_price ASC
             LIMIT ?"
        );

        let mut query = sqlx::query(&sql).bind(cutoff);
        for keyword in keywords {
            query = query.bind(like_pattern(keyword));
        }
        query = query.bind(self.config.supplier_top_n as i64);

        let rows = query.fetch_all(self.store.pool()).await?;
        let now = Utc::now();
        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(position, row)| {
                let rank = SupplierRank {
                    supplier: row.get("supplier"),
                    win_count: row.get("win_count"),
                    avg_price: row.get("avg_price"),
                    total_value: row.get("total_value"),
                };
                StructuredResult {
                    source: StructuredSource::AwardItems,
                    row_id: None,
                    text: rank.to_context_line(position + 1),
                    score: SCORE_COMPUTED_FACT,
                    effective_at: now,
                    citation: format!("award_items supplier ranking #{}", position + 1),
                }
            })
            .collect())
    }

    /// Plan rows have no supplier column; this source is empty by
    /// construction but stays in the fan-out so the six-way budget math is
    /// uniform across both item tables.
    async fn plan_supplier_ranks(&self) -> Result<Vec<StructuredResult>> {
        Ok(Vec::new())
    }

    async fn tender_keyword_hits(&self, keywords: &[String]) -> Result<Vec<StructuredResult>> {
        let title_condition = like_disjunction("title", keywords.len());
        let description_condition = like_disjunction("description", keywords.len());
        let cutoff = Utc::now() - chrono::Duration::days(365 * self.config.lookback_years as i64);
        let sql = format!(
            "SELECT id, title, description, buyer, published_at
             FROM tenders
             WHERE published_at >= ?
               AND (({title_condition}) OR ({description_condition}))
             ORDER BY published_at DESC
             LIMIT ?"
        );

        let mut query = sqlx::query(&sql).bind(cutoff);
        for keyword in keywords {
            query = query.bind(like_pattern(keyword));
        }
        for keyword in keywords {
            query = query.bind(like_pattern(keyword));
        }
        query = query.bind(self.config.row_limit as i64);

        let rows = query.fetch_all(self.store.pool()).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let id: String = row.get("id");
                let title: String = row.get("title");
                let description: Option<String> = row.get("description");
                let buyer: Option<String> = row.get("buyer");
                let published_at = row.get("published_at");

                let mut text = format!("Tender {id}: {title}");
                if let Some(buyer) = &buyer {
                    text.push_str(&format!(" (buyer: {buyer})"));
                }
                if let Some(description) = &description {
                    text.push_str(&format!(". {description}"));
                }

                StructuredResult {
                    source: StructuredSource::Tenders,
                    row_id: None,
                    text,
                    score: SCORE_KEYWORD_HIT,
                    effective_at: published_at,
                    citation: format!("tenders {id}"),
                }
            })
            .collect())
    }
}

/// Run one sub-query under its time budget. Timeouts and query errors both
/// drop the source (returning `None`); neither fails the overall search.
async fn run_bounded<F>(
    name: &'static str,
    budget: Duration,
    query: F,
) -> Option<Vec<StructuredResult>>
where
    F: Future<Output = Result<Vec<StructuredResult>>>,
{
    match tokio::time::timeout(budget, query).await {
        Ok(Ok(results)) => Some(results),
        Ok(Err(err)) => {
            tracing::warn!(source = name, "structured sub-query failed, dropping source: {err:#}");
            None
        }
        Err(_) => {
            tracing::warn!(
                source = name,
                budget_ms = budget.as_millis() as u64,
                "structured sub-query exceeded time budget, dropping source"
            );
            None
        }
    }
}

fn aggregate_result(stat: AggregateStat) -> StructuredResult {
    StructuredResult {
        source: stat.source,
        row_id: None,
        text: stat.to_context_line(),
        score: SCORE_COMPUTED_FACT,
        effective_at: year_start(stat.year),
        citation: format!("{} aggregate {} {}", stat.source.table_name(), stat.item_name, stat.year),
    }
}

/// Citation label for a keyword row hit, e.g. `award_items #42 (tender
/// T-123)`. Rows with no tender attribution omit the parenthetical.
fn citation(table: &str, id: i64, tender_id: Option<&str>) -> String {
    match tender_id {
        Some(tender) => format!("{table} #{id} (tender {tender})"),
        None => format!("{table} #{id}"),
    }
}

fn year_start(year: i32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// `col LIKE ? ESCAPE '\'` repeated `count` times, OR-joined. The pattern
/// values themselves are always bound, never interpolated.
fn like_disjunction(column: &str, count: usize) -> String {
    (0..count)
        .map(|_| format!("{column} LIKE ? ESCAPE '\\'"))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Escape LIKE wildcards in the keyword and wrap it for substring match.
fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

//! Query intent classification.
//!
//! Questions route down one of two retrieval paths: item-level (a specific
//! product's price, supplier, or specification, answered best by the
//! structured tables) and tender-level (a tender as a whole, answered by
//! title/description search and document chunks).
//!
//! Classification is a pure function over a data-driven rule table: each
//! rule is (regex pattern, language, category), and any match routes the
//! question item-level. Empty or unmatched questions take the tender-level
//! path, which is the more conservative one since it never asserts a
//! specific product fact.

use regex::Regex;
use serde::Serialize;

/// Intent of a user question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueryIntent {
    /// About a specific product/item: price, supplier, specification.
    ItemLevel,
    /// About a tender as a whole (or unclassifiable).
    TenderLevel,
}

/// Language a classification pattern is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    Russian,
}

/// What kind of item-level phrasing a pattern detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternCategory {
    /// "price for X", "how much does X cost"
    Price,
    /// "who won", "which supplier delivers"
    Supplier,
    /// "technical requirements for X"
    Specification,
    /// Known product vocabulary of the corpus (medical consumables etc.)
    ProductLexicon,
    /// "past prices", "price history"
    HistoricalPrice,
}

/// One row of the classification rule table.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationRule {
    pub pattern: &'static str,
    pub language: Language,
    pub category: PatternCategory,
}

/// Patterns whose match routes a question item-level. Evaluated
/// case-insensitively; extend per language rather than per call site.
pub const ITEM_LEVEL_RULES: &[ClassificationRule] = &[
    // English
    ClassificationRule {
        pattern: r"(?i)\b(prices?|costs?|how much|unit price)\b",
        language: Language::English,
        category: PatternCategory::Price,
    },
    ClassificationRule {
        pattern: r"(?i)\b(suppliers?|vendors?|who\s+(won|supplied|supplies|delivers))\b",
        language: Language::English,
        category: PatternCategory::Supplier,
    },
    ClassificationRule {
        pattern: r"(?i)\b(specifications?|specs|technical requirements?|characteristics)\b",
        language: Language::English,
        category: PatternCategory::Specification,
    },
    ClassificationRule {
        pattern: r"(?i)\b(drapes?|gloves?|syringes?|catheters?|bandages?|reagents?|masks?|gowns?|thermometers?)\b",
        language: Language::English,
        category: PatternCategory::ProductLexicon,
    },
    ClassificationRule {
        pattern: r"(?i)\b(past|historical|previous)\s+(prices?|costs?)\b",
        language: Language::English,
        category: PatternCategory::HistoricalPrice,
    },
    // Russian
    ClassificationRule {
        pattern: r"(?i)(цен[аыу]|стоимост|сколько стоит|почем)",
        language: Language::Russian,
        category: PatternCategory::Price,
    },
    ClassificationRule {
        pattern: r"(?i)(поставщик|кто\s+(выиграл|поставля)|победител)",
        language: Language::Russian,
        category: PatternCategory::Supplier,
    },
    ClassificationRule {
        pattern: r"(?i)(характеристик|спецификаци|технически[ех] требовани)",
        language: Language::Russian,
        category: PatternCategory::Specification,
    },
    ClassificationRule {
        pattern: r"(?i)(простын|перчатк|шприц|катетер|бинт|реагент|маск[аи]|халат|термометр)",
        language: Language::Russian,
        category: PatternCategory::ProductLexicon,
    },
    ClassificationRule {
        pattern: r"(?i)(прошл\w+\s+цен|истори[яи]\s+цен|динамик[аи]\s+цен)",
        language: Language::Russian,
        category: PatternCategory::HistoricalPrice,
    },
];

/// Compiled classifier over [`ITEM_LEVEL_RULES`]. Pure and side-effect
/// free; compile once, classify many.
pub struct QueryClassifier {
    rules: Vec<(Regex, Language, PatternCategory)>,
}

impl Default for QueryClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryClassifier {
    pub fn new() -> Self {
        let rules = ITEM_LEVEL_RULES
            .iter()
            .map(|rule| {
                (
                    Regex::new(rule.pattern).expect("classification rule table patterns are valid"),
                    rule.language,
                    rule.category,
                )
            })
            .collect();
        Self { rules }
    }

    /// Classify a question. Empty, whitespace-only, or unmatched input is
    /// tender-level.
    pub fn classify(&self, question: &str) -> QueryIntent {
        if question.trim().is_empty() {
            return QueryIntent::TenderLevel;
        }
        if self.rules.iter().any(|(regex, _, _)| regex.is_match(question)) {
            QueryIntent::ItemLevel
        } else {
            QueryIntent::TenderLevel
        }
    }

    /// The rule categories a question triggered, for debug logging.
    pub fn matched_categories(&self, question: &str) -> Vec<(Language, PatternCategory)> {
        self.rules
            .iter()
            .filter(|(regex, _, _)| regex.is_match(question))
            .map(|(_, language, category)| (*language, *category))
            .collect()
    }
}

/// Bilingual stopword list applied by [`extract_keywords`]: question scaffolding
/// and intent words that never name an item.
const STOPWORDS: &[&str] = &[
    // English
    "the", "a", "an", "of", "for", "in", "on", "at", "to", "is", "are", "was",
    "were", "what", "which", "who", "whom", "how", "much", "many", "does", "do",
    "did", "price", "prices", "cost", "costs", "supplier", "suppliers", "vendor",
    "vendors", "won", "win", "past", "historical", "previous", "year", "years",
    "tender", "tenders", "and", "or", "with", "about", "per", "unit",
    // Russian
    "что", "какая", "какой", "какие", "сколько", "стоит", "стоят", "цена",
    "цены", "цен", "за", "на", "по", "в", "и", "или", "кто", "выиграл",
    "поставщик", "поставщики", "прошлые", "прошлых", "год", "года", "годы",
    "лет", "тендер", "тендеры", "закупка", "закупки", "для",
];

/// Extract search keywords from a question: lowercase, strip punctuation,
/// drop stopwords and short tokens, dedup preserving order. Malformed or
/// empty questions simply yield fewer (or zero) keywords; they never fail.
pub fn extract_keywords(question: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for raw in question.split_whitespace() {
        let token: String = raw
            .chars()
            .filter(|ch| ch.is_alphanumeric() || *ch == '-')
            .collect::<String>()
            .to_lowercase();
        if token.chars().count() < 3 {
            continue;
        }
        if STOPWORDS.contains(&token.as_str()) {
            continue;
        }
        if !keywords.contains(&token) {
            keywords.push(token);
        }
    }
    keywords
}

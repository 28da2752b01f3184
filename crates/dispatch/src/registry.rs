//! Message template registry.
//!
//! Templates are keyed by `(key, language)`. Lookup tries the exact language
//! first, then the base language (`en-IN` → `en`), matching how templates are
//! provisioned per locale.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// One registry row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TemplateRow {
    pub key: String,
    pub language: String,
    /// Provider-side template name.
    pub meta_name: String,
    pub components: serde_json::Value,
    pub var_order: Option<serde_json::Value>,
}

impl TemplateRow {
    /// Canonical named-variable ordering, when configured.
    pub fn var_order(&self) -> Option<Vec<String>> {
        let order = self.var_order.as_ref()?.as_array()?;
        Some(
            order
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
        )
    }
}

/// Source of template rows; injectable so the dispatcher is testable
/// without a database.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn lookup(&self, key: &str, language: &str) -> anyhow::Result<Option<TemplateRow>>;
}

/// PostgreSQL-backed registry.
pub struct PgTemplateRegistry {
    pool: PgPool,
}

impl PgTemplateRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Candidate languages in lookup order: exact, then base.
    fn candidate_languages(language: &str) -> Vec<String> {
        let mut langs = vec![language.to_string()];
        if let Some(base) = language.split(['-', '_']).next()
            && base != language
        {
            langs.push(base.to_string());
        }
        langs
    }
}

#[async_trait]
impl TemplateSource for PgTemplateRegistry {
    async fn lookup(&self, key: &str, language: &str) -> anyhow::Result<Option<TemplateRow>> {
        for lang in Self::candidate_languages(language) {
            let row: Option<TemplateRow> = sqlx::query_as(
                r#"
                SELECT key, language, meta_name, components, var_order
                FROM message_templates
                WHERE key = $1 AND LOWER(language) = LOWER($2)
                LIMIT 1
                "#,
            )
            .bind(key)
            .bind(&lang)
            .fetch_optional(&self.pool)
            .await?;

            if row.is_some() {
                return Ok(row);
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn candidate_languages_include_base() {
        assert_eq!(
            PgTemplateRegistry::candidate_languages("en-IN"),
            vec!["en-IN", "en"]
        );
        assert_eq!(
            PgTemplateRegistry::candidate_languages("en_US"),
            vec!["en_US", "en"]
        );
        assert_eq!(PgTemplateRegistry::candidate_languages("en"), vec!["en"]);
    }

    #[test]
    fn var_order_parses_string_array() {
        let row = TemplateRow {
            key: "k".to_string(),
            language: "en".to_string(),
            meta_name: "k_en".to_string(),
            components: json!([]),
            var_order: Some(json!(["name", "amount"])),
        };
        assert_eq!(
            row.var_order(),
            Some(vec!["name".to_string(), "amount".to_string()])
        );
    }

    #[test]
    fn var_order_absent_when_not_configured() {
        let row = TemplateRow {
            key: "k".to_string(),
            language: "en".to_string(),
            meta_name: "k_en".to_string(),
            components: json!([]),
            var_order: None,
        };
        assert_eq!(row.var_order(), None);
    }
}

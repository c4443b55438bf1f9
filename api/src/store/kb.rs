use sqlx::PgExecutor;
use uuid::Uuid;

use triage_core::tickets::Ticket;

use crate::error::AppError;

/// Knowledge-base article title derived from the ticket's issue type.
/// Create-or-update is keyed on this title, so repeated resolutions of the
/// same issue type refresh one article instead of piling up duplicates.
pub fn derive_kb_title(issue_type: &str) -> String {
    format!("Resolved: {}", issue_type.trim())
}

/// Category first, then ticket tags, deduplicated preserving order.
pub fn article_tags(category: &str, tags: &[String]) -> Vec<String> {
    let mut out = vec![category.to_string()];
    for tag in tags {
        if !out.iter().any(|existing| existing == tag) {
            out.push(tag.clone());
        }
    }
    out
}

pub async fn upsert_article(
    exec: impl PgExecutor<'_>,
    ticket: &Ticket,
    resolution: &str,
) -> Result<(), AppError> {
    let title = derive_kb_title(&ticket.issue_type);
    let tags = serde_json::to_value(article_tags(&ticket.category, &ticket.tags))
        .map_err(|e| AppError::Internal(format!("Failed to serialize article tags: {e}")))?;
    let content = format!(
        "Description: {}\n\nResolution:\n{}",
        ticket.description.as_deref().unwrap_or("(none provided)"),
        resolution
    );

    sqlx::query(
        r#"
        INSERT INTO kb_articles (id, title, content, tags, source_ticket_id)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (title) DO UPDATE
        SET content = EXCLUDED.content, tags = EXCLUDED.tags, updated_at = now()
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(&title)
    .bind(&content)
    .bind(&tags)
    .bind(ticket.id)
    .execute(exec)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_derived_from_trimmed_issue_type() {
        assert_eq!(derive_kb_title("  VPN drops hourly "), "Resolved: VPN drops hourly");
    }

    #[test]
    fn tags_lead_with_category_and_dedupe() {
        let tags = article_tags(
            "network",
            &["vpn".to_string(), "network".to_string(), "vpn".to_string()],
        );
        assert_eq!(tags, vec!["network".to_string(), "vpn".to_string()]);
    }
}

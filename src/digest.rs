use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::models::{
    Article, ArticleId, Digest, DigestEntry, DigestEvent, DigestOutcome, DigestSection, Ratings,
    SavedArticle,
};
use crate::news::FetchOutcome;

const WORDS_PER_MINUTE: usize = 225;

/// Build the digest for one run.
///
/// Sections follow the order of `selected`. Within a section, entries are
/// newest first; equal or missing timestamps keep fetch order, with undated
/// articles last. An article tagged with several categories is listed once,
/// under the first selected category that returned it.
pub fn assemble(
    selected: &[String],
    fetched: &FetchOutcome,
    saved: &[SavedArticle],
    ratings: &Ratings,
    now: DateTime<Utc>,
) -> Digest {
    let by_id: HashMap<&ArticleId, &Article> = fetched.articles.iter().map(|a| (&a.id, a)).collect();
    let saved_ids: HashSet<&ArticleId> = saved.iter().map(|s| &s.article_id).collect();
    let mut placed: HashSet<&ArticleId> = HashSet::new();

    let mut sections = Vec::with_capacity(selected.len());
    for category in selected {
        let Some(report) = fetched.reports.iter().find(|r| &r.category == category) else {
            continue;
        };

        let mut articles: Vec<&Article> = report
            .article_ids
            .iter()
            .filter(|id| placed.insert(*id))
            .filter_map(|id| by_id.get(id).copied())
            .collect();
        // Stable sort keeps fetch order for ties.
        articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        let entries = articles
            .into_iter()
            .map(|article| DigestEntry {
                is_saved: saved_ids.contains(&article.id),
                rating: ratings.get(&article.id).map(|r| r.score),
                reading_minutes: reading_minutes(article.display_text()),
                article: article.clone(),
            })
            .collect();

        sections.push(DigestSection {
            category: category.clone(),
            status: report.status.clone(),
            entries,
        });
    }

    let mut digest = Digest {
        generated_at: now,
        outcome: DigestOutcome::Fresh,
        sections,
        new_articles: fetched.new_article_ids.len(),
    };
    digest.outcome = classify(&digest);
    digest
}

fn classify(digest: &Digest) -> DigestOutcome {
    if digest.article_count() == 0 {
        DigestOutcome::Empty
    } else if digest.sections.iter().any(|s| !s.status.is_fresh()) {
        DigestOutcome::PartiallyStale
    } else {
        DigestOutcome::Fresh
    }
}

/// Estimated minutes to read `text`, never less than one.
pub fn reading_minutes(text: &str) -> u32 {
    let words = text.split_whitespace().count();
    (words / WORDS_PER_MINUTE).max(1) as u32
}

/// History entry for a generated digest.
pub fn digest_event(digest: &Digest) -> DigestEvent {
    DigestEvent {
        timestamp: digest.generated_at,
        categories: digest.categories(),
        article_count: digest.article_count(),
        new_articles: digest.new_articles,
        outcome: digest.outcome,
    }
}

/// Sections that contributed at least one article.
pub fn categories_covered(digest: &Digest) -> usize {
    digest.sections.iter().filter(|s| !s.entries.is_empty()).count()
}

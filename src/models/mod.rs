mod article;
mod digest;
mod preferences;
mod summary;
mod user_data;

pub use article::{Article, ArticleId, RawArticle};
pub use digest::{CategoryStatus, Digest, DigestEntry, DigestOutcome, DigestSection};
pub use preferences::{Frequency, UserPreferences};
pub use summary::SummaryStatus;
pub use user_data::{
    rating_distribution, Analytics, DataSizes, DigestEvent, Rating, Ratings, SavedArticle,
    UserDataExport, UserStats, MAX_RATING, MIN_RATING,
};

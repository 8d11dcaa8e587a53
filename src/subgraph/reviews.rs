//! Reviews subgraph.
//!
//! Owns `Review` and contributes `reviews` to `User` and `Movie`, plus the
//! derived `Movie.averageRating`. `Review.author` and `Review.movie` are
//! answered with key-only stubs that the router resolves against the users
//! and movies subgraphs.

use std::sync::Arc;

use async_graphql::{
    ComplexObject, Context, EmptySubscription, ID, InputObject, Object, Schema, SimpleObject,
};
use async_trait::async_trait;
use chrono::NaiveDate;

use super::{Subgraph, SubgraphSettings, Viewer, federation_options};
use crate::entity::{Appendable, Entity, EntityRef, format_date};
use crate::error::Result;
use crate::store::{AppendStore, InMemoryStore};
use crate::subgraph::movies::Movie;
use crate::subgraph::users::User;

pub type ReviewStore = Arc<dyn AppendStore<Review>>;
pub type ReviewsSchema = Schema<Query, Mutation, EmptySubscription>;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

#[derive(SimpleObject, Clone, Debug, PartialEq)]
#[graphql(complex)]
pub struct Review {
    pub id: ID,
    pub rating: i32,
    pub comment: String,
    #[graphql(skip)]
    pub author_id: String,
    #[graphql(skip)]
    pub movie_id: String,
    #[graphql(skip)]
    pub created_at: NaiveDate,
}

impl Review {
    pub fn author_ref(&self) -> EntityRef<User> {
        EntityRef::reference(self.author_id.as_str())
    }

    pub fn movie_ref(&self) -> EntityRef<Movie> {
        EntityRef::reference(self.movie_id.as_str())
    }
}

#[ComplexObject]
impl Review {
    async fn author(&self) -> UserReference {
        UserReference::from(self.author_ref())
    }

    async fn movie(&self) -> MovieReference {
        MovieReference::from(self.movie_ref())
    }

    #[graphql(name = "createdAt")]
    async fn created_at_field(&self) -> String {
        format_date(self.created_at)
    }
}

impl Entity for Review {
    const TYPENAME: &'static str = "Review";

    fn id(&self) -> &str {
        self.id.as_str()
    }
}

/// Caller-controlled part of a new review.
#[derive(Clone, Debug)]
pub struct NewReview {
    pub rating: i32,
    pub comment: String,
    pub author_id: String,
    pub movie_id: String,
}

impl Appendable for Review {
    type Draft = NewReview;
    const ID_PREFIX: &'static str = "r";

    fn assemble(id: String, created_at: NaiveDate, draft: NewReview) -> Self {
        Review {
            id: ID::from(id),
            rating: draft.rating,
            comment: draft.comment,
            author_id: draft.author_id,
            movie_id: draft.movie_id,
            created_at,
        }
    }
}

/// `User` as seen from this subgraph: the key plus the reviews it wrote.
#[derive(SimpleObject, Clone, Debug)]
#[graphql(name = "User", complex)]
pub struct UserReference {
    pub id: ID,
}

impl From<EntityRef<User>> for UserReference {
    fn from(entity: EntityRef<User>) -> Self {
        UserReference {
            id: ID::from(entity.id()),
        }
    }
}

#[ComplexObject]
impl UserReference {
    async fn reviews(&self, ctx: &Context<'_>) -> Vec<Review> {
        let reviews = store(ctx).list_all().await;
        reviews
            .into_iter()
            .filter(|review| review.author_id == self.id.as_str())
            .collect()
    }
}

/// `Movie` as seen from this subgraph: the key plus review-derived fields.
#[derive(SimpleObject, Clone, Debug)]
#[graphql(name = "Movie", complex)]
pub struct MovieReference {
    pub id: ID,
}

impl From<EntityRef<Movie>> for MovieReference {
    fn from(entity: EntityRef<Movie>) -> Self {
        MovieReference {
            id: ID::from(entity.id()),
        }
    }
}

#[ComplexObject]
impl MovieReference {
    async fn reviews(&self, ctx: &Context<'_>) -> Vec<Review> {
        reviews_of_movie(store(ctx), &self.id).await
    }

    /// Mean rating rounded to two decimals, null while the movie has no reviews.
    async fn average_rating(&self, ctx: &Context<'_>) -> Option<f64> {
        let reviews = reviews_of_movie(store(ctx), &self.id).await;
        average_rating(reviews.iter().map(|review| review.rating))
    }
}

async fn reviews_of_movie(store: &ReviewStore, movie_id: &str) -> Vec<Review> {
    store
        .list_all()
        .await
        .into_iter()
        .filter(|review| review.movie_id == movie_id)
        .collect()
}

/// Arithmetic mean rounded half away from zero to two decimals.
///
/// The rounding happens on integer hundredths, so ties such as 4.125 always
/// land on the same side.
pub fn average_rating(ratings: impl IntoIterator<Item = i32>) -> Option<f64> {
    let (sum, count) = ratings
        .into_iter()
        .fold((0i64, 0i64), |(sum, count), rating| (sum + i64::from(rating), count + 1));
    if count == 0 {
        return None;
    }

    let scaled = sum * 100;
    let hundredths = if scaled >= 0 {
        (scaled * 2 + count) / (count * 2)
    } else {
        -((-scaled * 2 + count) / (count * 2))
    };
    Some(hundredths as f64 / 100.0)
}

pub fn seed() -> Vec<Review> {
    let reviews = [
        ("r1", 5, "Mind-bending masterpiece! The concept is incredible.", "1", "101", (6, 1)),
        ("r2", 5, "Best superhero movie ever made. Heath Ledger was phenomenal.", "2", "102", (6, 5)),
        ("r3", 4, "Visually stunning and emotionally powerful. A journey through space and time.", "1", "103", (6, 10)),
        ("r4", 5, "A classic that aged perfectly. Tarantino at his finest.", "3", "104", (6, 15)),
        ("r5", 4, "Changed cinema forever. The visual effects still hold up.", "2", "105", (6, 20)),
        ("r6", 4, "Great rewatch value. Every viewing reveals something new.", "3", "101", (6, 25)),
        ("r7", 5, "An absolute classic. The plot twists are mind-blowing.", "4", "106", (7, 1)),
        ("r8", 5, "One of the greatest films ever made. Powerful storytelling.", "5", "107", (7, 5)),
        ("r9", 5, "The Godfather of all crime films. Masterful direction.", "1", "108", (7, 10)),
        ("r10", 4, "Dark and thought-provoking. A must-watch for film lovers.", "2", "106", (7, 15)),
    ];

    reviews
        .into_iter()
        .map(|(id, rating, comment, author_id, movie_id, (month, day))| Review {
            id: ID::from(id),
            rating,
            comment: comment.to_string(),
            author_id: author_id.to_string(),
            movie_id: movie_id.to_string(),
            created_at: NaiveDate::from_ymd_opt(2024, month, day).unwrap_or_default(),
        })
        .collect()
}

fn store<'a>(ctx: &Context<'a>) -> &'a ReviewStore {
    ctx.data_unchecked::<ReviewStore>()
}

pub struct Query;

#[Object]
impl Query {
    async fn review(&self, ctx: &Context<'_>, id: ID) -> Option<Review> {
        store(ctx).get_by_id(&id).await
    }

    /// The first `limit` reviews in store order. Negative limits yield nothing.
    async fn recent_reviews(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = 10)] limit: i32,
    ) -> Vec<Review> {
        let limit = usize::try_from(limit).unwrap_or(0);
        store(ctx).list_first(limit).await
    }

    #[graphql(entity)]
    async fn find_review_by_id(&self, ctx: &Context<'_>, id: ID) -> Option<Review> {
        EntityRef::<Review>::reference(id.as_str())
            .resolve(&**store(ctx))
            .await
    }

    // Any user or movie id resolves here; an unknown id simply has no reviews.
    #[graphql(entity)]
    async fn find_user_by_id(&self, id: ID) -> UserReference {
        UserReference { id }
    }

    #[graphql(entity)]
    async fn find_movie_by_id(&self, id: ID) -> MovieReference {
        MovieReference { id }
    }
}

#[derive(InputObject, Clone, Debug)]
pub struct CreateReviewInput {
    pub rating: i32,
    pub comment: String,
    pub movie_id: ID,
}

pub struct Mutation;

#[Object]
impl Mutation {
    async fn create_review(
        &self,
        ctx: &Context<'_>,
        input: CreateReviewInput,
    ) -> async_graphql::Result<Review> {
        if !(MIN_RATING..=MAX_RATING).contains(&input.rating) {
            return Err(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}, got {}",
                input.rating
            )
            .into());
        }

        let author_id = match ctx.data_opt::<Viewer>().and_then(|v| v.user_id.clone()) {
            Some(id) => id,
            None => {
                let settings = ctx.data_unchecked::<SubgraphSettings>();
                tracing::warn!(
                    author = %settings.fallback_author,
                    "review created without caller identity, using fallback author"
                );
                settings.fallback_author.clone()
            }
        };

        let review = store(ctx)
            .append(NewReview {
                rating: input.rating,
                comment: input.comment,
                author_id,
                movie_id: input.movie_id.to_string(),
            })
            .await;
        tracing::info!(id = %review.id.as_str(), movie = %review.movie_id, "review created");
        Ok(review)
    }
}

pub struct ReviewsSubgraph {
    schema: ReviewsSchema,
}

impl ReviewsSubgraph {
    pub fn new(store: ReviewStore, settings: SubgraphSettings) -> Self {
        let schema = Schema::build(Query, Mutation, EmptySubscription)
            .data(store)
            .data(settings)
            .enable_federation()
            .finish();
        ReviewsSubgraph { schema }
    }

    pub fn seeded(settings: SubgraphSettings) -> Result<Self> {
        let store: ReviewStore = Arc::new(InMemoryStore::new(seed())?);
        Ok(ReviewsSubgraph::new(store, settings))
    }
}

#[async_trait]
impl Subgraph for ReviewsSubgraph {
    fn name(&self) -> &'static str {
        "reviews"
    }

    async fn execute(&self, request: async_graphql::Request) -> async_graphql::Response {
        self.schema.execute(request).await
    }

    fn federation_sdl(&self) -> String {
        self.schema.sdl_with_options(federation_options())
    }

    fn sdl(&self) -> String {
        self.schema.sdl()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKey;
    use crate::store::EntityStore;
    use crate::subgraph::test_support::{run, run_as};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const CREATE_REVIEW: &str = r#"
        mutation($input: CreateReviewInput!) {
          createReview(input: $input) { id rating comment createdAt author { id } movie { id } }
        }
    "#;

    const MOVIE_ENTITIES: &str = r#"
        query($representations: [_Any!]!) {
          _entities(representations: $representations) {
            ... on Movie { id averageRating reviews { id } }
          }
        }
    "#;

    fn fixed_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn subgraph() -> (ReviewsSubgraph, Arc<InMemoryStore<Review>>) {
        let store = Arc::new(InMemoryStore::new(seed()).unwrap().with_clock(fixed_day));
        let subgraph = ReviewsSubgraph::new(store.clone(), SubgraphSettings::default());
        (subgraph, store)
    }

    #[test]
    fn average_of_nothing_is_none() {
        assert_eq!(average_rating(Vec::new()), None);
    }

    #[test]
    fn average_rounds_to_two_decimals() {
        assert_eq!(average_rating([5, 5, 4]), Some(4.67));
        assert_eq!(average_rating([1, 2, 2]), Some(1.67));
        assert_eq!(average_rating([4, 5]), Some(4.5));
        assert_eq!(average_rating([3]), Some(3.0));
    }

    #[test]
    fn average_ties_round_away_from_zero() {
        // 33/8 = 4.125
        assert_eq!(average_rating([5, 5, 5, 5, 4, 4, 4, 1]), Some(4.13));
        // 1/8 = 0.125
        assert_eq!(average_rating([1, 0, 0, 0, 0, 0, 0, 0]), Some(0.13));
    }

    #[test]
    fn stubs_carry_only_the_foreign_key() {
        let review = &seed()[3];
        assert_eq!(review.author_ref(), EntityRef::Reference(EntityKey::new("User", "3")));
        assert_eq!(review.movie_ref(), EntityRef::Reference(EntityKey::new("Movie", "104")));
    }

    #[tokio::test]
    async fn movie_entities_get_reviews_and_average() {
        let (subgraph, _) = subgraph();
        let variables = json!({
            "representations": [
                { "__typename": "Movie", "id": "101" },
                { "__typename": "Movie", "id": "999" },
            ]
        });
        let response = run(&subgraph, MOVIE_ENTITIES, variables).await;
        assert_eq!(
            response,
            json!({
                "data": {
                    "_entities": [
                        { "id": "101", "averageRating": 4.5, "reviews": [{ "id": "r1" }, { "id": "r6" }] },
                        { "id": "999", "averageRating": null, "reviews": [] },
                    ]
                }
            })
        );
    }

    #[tokio::test]
    async fn user_entities_get_their_reviews() {
        let (subgraph, _) = subgraph();
        let query = r#"
            query($representations: [_Any!]!) {
              _entities(representations: $representations) { ... on User { reviews { id } } }
            }
        "#;
        let variables = json!({ "representations": [{ "__typename": "User", "id": "1" }] });
        let response = run(&subgraph, query, variables).await;
        assert_eq!(
            response["data"]["_entities"][0]["reviews"],
            json!([{ "id": "r1" }, { "id": "r3" }, { "id": "r9" }])
        );
    }

    #[tokio::test]
    async fn review_entities_resolve_from_the_store() {
        let (subgraph, _) = subgraph();
        let query = r#"
            query($representations: [_Any!]!) {
              _entities(representations: $representations) { ... on Review { id rating } }
            }
        "#;
        let variables = json!({
            "representations": [
                { "__typename": "Review", "id": "r2" },
                { "__typename": "Review", "id": "r999" }
            ]
        });
        let response = run(&subgraph, query, variables).await;
        assert_eq!(
            response,
            json!({ "data": { "_entities": [{ "id": "r2", "rating": 5 }, null] } })
        );
    }

    #[tokio::test]
    async fn cross_domain_fields_return_stubs() {
        let (subgraph, _) = subgraph();
        let response = run(
            &subgraph,
            r#"{ review(id: "r2") { author { id } movie { id } } missing: review(id: "r404") { id } }"#,
            json!({}),
        )
        .await;
        assert_eq!(
            response,
            json!({
                "data": {
                    "review": { "author": { "id": "2" }, "movie": { "id": "102" } },
                    "missing": null
                }
            })
        );
    }

    #[tokio::test]
    async fn recent_reviews_keep_store_order() {
        let (subgraph, _) = subgraph();
        let response = run(&subgraph, "{ recentReviews(limit: 3) { id } }", json!({})).await;
        assert_eq!(
            response["data"]["recentReviews"],
            json!([{ "id": "r1" }, { "id": "r2" }, { "id": "r3" }])
        );

        let response = run(&subgraph, "{ recentReviews(limit: -2) { id } }", json!({})).await;
        assert_eq!(response["data"]["recentReviews"], json!([]));
    }

    #[tokio::test]
    async fn created_review_is_listed_with_server_fields() {
        let (subgraph, store) = subgraph();
        let variables = json!({ "input": { "rating": 5, "comment": "x", "movieId": "101" } });
        let created = run(&subgraph, CREATE_REVIEW, variables).await;

        assert_eq!(
            created,
            json!({
                "data": {
                    "createReview": {
                        "id": "r11",
                        "rating": 5,
                        "comment": "x",
                        "createdAt": "2025-03-14",
                        "author": { "id": "1" },
                        "movie": { "id": "101" }
                    }
                }
            })
        );

        let listed = run(&subgraph, "{ recentReviews(limit: 100) { id comment } }", json!({})).await;
        let listed = listed["data"]["recentReviews"].as_array().unwrap().clone();
        assert_eq!(listed.len(), 11);
        assert_eq!(listed[10], json!({ "id": "r11", "comment": "x" }));
        assert!(store.get_by_id("r11").await.is_some());

        let variables = json!({ "representations": [{ "__typename": "Movie", "id": "101" }] });
        let average = run(&subgraph, MOVIE_ENTITIES, variables).await;
        assert_eq!(average["data"]["_entities"][0]["averageRating"], 4.67);
    }

    #[tokio::test]
    async fn author_comes_from_the_viewer() {
        let (subgraph, _) = subgraph();
        let variables = json!({ "input": { "rating": 3, "comment": "fine", "movieId": "102" } });
        let created = run_as(&subgraph, Viewer::user("4"), CREATE_REVIEW, variables).await;
        assert_eq!(created["data"]["createReview"]["author"], json!({ "id": "4" }));
    }

    #[tokio::test]
    async fn out_of_range_rating_is_rejected() {
        let (subgraph, store) = subgraph();
        let variables = json!({ "input": { "rating": 6, "comment": "x", "movieId": "101" } });
        let response = run(&subgraph, CREATE_REVIEW, variables).await;

        assert_eq!(response["data"], serde_json::Value::Null);
        let message = response["errors"][0]["message"].as_str().unwrap();
        assert!(message.contains("between 1 and 5"), "{message}");
        assert_eq!(store.len().await, 10);
    }

    #[tokio::test]
    async fn unparseable_query_fails_without_data() {
        let (subgraph, _) = subgraph();
        let response = run(&subgraph, "{ recentReviews(limit: ", json!({})).await;
        assert_eq!(response["data"], serde_json::Value::Null);
        assert!(!response["errors"].as_array().unwrap().is_empty());
    }
}

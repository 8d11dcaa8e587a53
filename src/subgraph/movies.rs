use std::sync::Arc;

use async_graphql::{Context, EmptyMutation, EmptySubscription, ID, Object, Schema, SimpleObject};
use async_trait::async_trait;

use super::{Subgraph, federation_options};
use crate::entity::{Entity, EntityRef};
use crate::error::Result;
use crate::store::{EntityStore, InMemoryStore};

pub type MovieStore = Arc<dyn EntityStore<Movie>>;
pub type MoviesSchema = Schema<Query, EmptyMutation, EmptySubscription>;

#[derive(SimpleObject, Clone, Debug, PartialEq)]
pub struct Movie {
    pub id: ID,
    pub title: String,
    pub release_year: i32,
    pub genre: String,
    /// Running time in minutes.
    pub duration: i32,
    pub poster: String,
    pub description: String,
}

impl Entity for Movie {
    const TYPENAME: &'static str = "Movie";

    fn id(&self) -> &str {
        self.id.as_str()
    }
}

const POSTER_CINEMA: &str = "https://images.unsplash.com/photo-1489599849927-2ee91cede3ba?w=300";
const POSTER_CITY: &str = "https://images.unsplash.com/photo-1534447677768-be436bb09401?w=300";
const POSTER_SPACE: &str = "https://images.unsplash.com/photo-1446776877081-d282a0f896e2?w=300";

#[allow(clippy::too_many_arguments)]
fn movie(
    id: &str,
    title: &str,
    release_year: i32,
    genre: &str,
    duration: i32,
    poster: &str,
    description: &str,
) -> Movie {
    Movie {
        id: ID::from(id),
        title: title.to_string(),
        release_year,
        genre: genre.to_string(),
        duration,
        poster: poster.to_string(),
        description: description.to_string(),
    }
}

pub fn seed() -> Vec<Movie> {
    vec![
        movie(
            "101",
            "Inception",
            2010,
            "Sci-Fi",
            148,
            POSTER_CINEMA,
            "A mind-bending heist thriller about entering people's dreams.",
        ),
        movie(
            "102",
            "The Dark Knight",
            2008,
            "Action",
            152,
            POSTER_CITY,
            "Batman faces the Joker in this epic crime thriller.",
        ),
        movie(
            "103",
            "Interstellar",
            2014,
            "Sci-Fi",
            169,
            POSTER_SPACE,
            "A team of explorers travel through a wormhole in space.",
        ),
        movie(
            "104",
            "Pulp Fiction",
            1994,
            "Crime",
            154,
            POSTER_CINEMA,
            "The lives of two mob hitmen, a boxer, and others intertwine.",
        ),
        movie(
            "105",
            "The Matrix",
            1999,
            "Sci-Fi",
            136,
            POSTER_CITY,
            "A computer hacker learns about the true nature of reality.",
        ),
        movie(
            "106",
            "Fight Club",
            1999,
            "Drama",
            139,
            POSTER_CINEMA,
            "An insomniac office worker and a devil-may-care soapmaker form an underground fight club.",
        ),
        movie(
            "107",
            "The Shawshank Redemption",
            1994,
            "Drama",
            142,
            POSTER_CITY,
            "Two imprisoned men bond over a number of years, finding solace and eventual redemption.",
        ),
        movie(
            "108",
            "The Godfather",
            1972,
            "Crime",
            175,
            POSTER_SPACE,
            "The aging patriarch of an organized crime dynasty transfers control to his reluctant son.",
        ),
    ]
}

fn store<'a>(ctx: &Context<'a>) -> &'a MovieStore {
    ctx.data_unchecked::<MovieStore>()
}

pub struct Query;

#[Object]
impl Query {
    async fn movie(&self, ctx: &Context<'_>, id: ID) -> Option<Movie> {
        store(ctx).get_by_id(&id).await
    }

    async fn movies(&self, ctx: &Context<'_>) -> Vec<Movie> {
        store(ctx).list_all().await
    }

    /// The first `limit` movies in catalogue order. Negative limits yield nothing.
    async fn top_movies(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = 5)] limit: i32,
    ) -> Vec<Movie> {
        let limit = usize::try_from(limit).unwrap_or(0);
        store(ctx).list_first(limit).await
    }

    #[graphql(entity)]
    async fn find_movie_by_id(&self, ctx: &Context<'_>, id: ID) -> Option<Movie> {
        EntityRef::<Movie>::reference(id.as_str())
            .resolve(&**store(ctx))
            .await
    }
}

pub struct MoviesSubgraph {
    schema: MoviesSchema,
}

impl MoviesSubgraph {
    pub fn new(store: MovieStore) -> Self {
        let schema = Schema::build(Query, EmptyMutation, EmptySubscription)
            .data(store)
            .enable_federation()
            .finish();
        MoviesSubgraph { schema }
    }

    pub fn seeded() -> Result<Self> {
        let store: MovieStore = Arc::new(InMemoryStore::new(seed())?);
        Ok(MoviesSubgraph::new(store))
    }
}

#[async_trait]
impl Subgraph for MoviesSubgraph {
    fn name(&self) -> &'static str {
        "movies"
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
    use crate::subgraph::test_support::run;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn subgraph() -> MoviesSubgraph {
        MoviesSubgraph::seeded().unwrap()
    }

    #[tokio::test]
    async fn top_movies_takes_catalogue_order() {
        let response = run(&subgraph(), "{ topMovies(limit: 2) { title } }", json!({})).await;
        assert_eq!(
            response,
            json!({
                "data": {
                    "topMovies": [{ "title": "Inception" }, { "title": "The Dark Knight" }]
                }
            })
        );
    }

    #[tokio::test]
    async fn top_movies_limit_edges() {
        let response = run(
            &subgraph(),
            "{ none: topMovies(limit: -3) { id } all: topMovies(limit: 50) { id } defaulted: topMovies { id } }",
            json!({}),
        )
        .await;
        assert_eq!(response["data"]["none"], json!([]));
        assert_eq!(response["data"]["all"].as_array().unwrap().len(), 8);
        assert_eq!(response["data"]["defaulted"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn movie_by_id_exposes_all_fields() {
        let response = run(
            &subgraph(),
            r#"{ movie(id: "105") { title releaseYear genre duration } missing: movie(id: "1") { id } }"#,
            json!({}),
        )
        .await;
        assert_eq!(
            response["data"],
            json!({
                "movie": { "title": "The Matrix", "releaseYear": 1999, "genre": "Sci-Fi", "duration": 136 },
                "missing": null
            })
        );
    }

    #[tokio::test]
    async fn movie_entities_resolve_by_id() {
        let query = r#"
            query($representations: [_Any!]!) {
              _entities(representations: $representations) { ... on Movie { title } }
            }
        "#;
        let variables = json!({ "representations": [{ "__typename": "Movie", "id": "108" }] });
        let response = run(&subgraph(), query, variables).await;
        assert_eq!(response["data"]["_entities"], json!([{ "title": "The Godfather" }]));
    }
}

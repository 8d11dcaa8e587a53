use std::sync::Arc;

use async_graphql::{
    ComplexObject, Context, EmptyMutation, EmptySubscription, ID, Object, Schema, SimpleObject,
};
use async_trait::async_trait;
use chrono::NaiveDate;

use super::{Subgraph, Viewer, federation_options};
use crate::entity::{Entity, EntityRef, format_date};
use crate::error::Result;
use crate::store::{EntityStore, InMemoryStore};

pub type UserStore = Arc<dyn EntityStore<User>>;
pub type UsersSchema = Schema<Query, EmptyMutation, EmptySubscription>;

#[derive(SimpleObject, Clone, Debug, PartialEq)]
#[graphql(complex)]
pub struct User {
    pub id: ID,
    pub username: String,
    pub email: String,
    #[graphql(skip)]
    pub created_at: NaiveDate,
}

#[ComplexObject]
impl User {
    #[graphql(name = "createdAt")]
    async fn created_at_field(&self) -> String {
        format_date(self.created_at)
    }
}

impl Entity for User {
    const TYPENAME: &'static str = "User";

    fn id(&self) -> &str {
        self.id.as_str()
    }
}

fn user(id: &str, username: &str, created_at: (i32, u32, u32)) -> User {
    let (year, month, day) = created_at;
    User {
        id: ID::from(id),
        username: username.to_string(),
        email: format!("{username}@bytemonk.com"),
        created_at: NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default(),
    }
}

pub fn seed() -> Vec<User> {
    vec![
        user("1", "alice", (2024, 1, 15)),
        user("2", "bob", (2024, 2, 20)),
        user("3", "charlie", (2024, 3, 10)),
        user("4", "diana", (2024, 4, 5)),
        user("5", "eve", (2024, 5, 12)),
    ]
}

fn store<'a>(ctx: &Context<'a>) -> &'a UserStore {
    ctx.data_unchecked::<UserStore>()
}

pub struct Query;

#[Object]
impl Query {
    /// The calling user, or the first user when the request carries no identity.
    async fn me(&self, ctx: &Context<'_>) -> Option<User> {
        let users = store(ctx);
        match ctx.data_opt::<Viewer>().and_then(|v| v.user_id.as_deref()) {
            Some(id) => users.get_by_id(id).await,
            None => users.list_first(1).await.into_iter().next(),
        }
    }

    async fn user(&self, ctx: &Context<'_>, id: ID) -> Option<User> {
        store(ctx).get_by_id(&id).await
    }

    async fn users(&self, ctx: &Context<'_>) -> Vec<User> {
        store(ctx).list_all().await
    }

    #[graphql(entity)]
    async fn find_user_by_id(&self, ctx: &Context<'_>, id: ID) -> Option<User> {
        let user = EntityRef::<User>::reference(id.as_str())
            .resolve(&**store(ctx))
            .await;
        if user.is_none() {
            tracing::debug!(typename = User::TYPENAME, id = %id.as_str(), "reference did not resolve");
        }
        user
    }
}

pub struct UsersSubgraph {
    schema: UsersSchema,
}

impl UsersSubgraph {
    pub fn new(store: UserStore) -> Self {
        let schema = Schema::build(Query, EmptyMutation, EmptySubscription)
            .data(store)
            .enable_federation()
            .finish();
        UsersSubgraph { schema }
    }

    pub fn seeded() -> Result<Self> {
        let store: UserStore = Arc::new(InMemoryStore::new(seed())?);
        Ok(UsersSubgraph::new(store))
    }
}

#[async_trait]
impl Subgraph for UsersSubgraph {
    fn name(&self) -> &'static str {
        "users"
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

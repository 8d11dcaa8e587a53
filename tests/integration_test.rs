use movie_federation::client::{DEFAULT_TIMEOUT, ProbeTarget, ServiceState};
use movie_federation::server::{self, RunningSubgraph, VIEWER_HEADER};
use movie_federation::{GraphQLRequest, HttpGraphQLClient, SubgraphKind, SubgraphSettings};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use serial_test::serial;
use std::net::SocketAddr;

// Test fixture owning one running server per subgraph
struct TestFixture {
    users: RunningSubgraph,
    movies: RunningSubgraph,
    reviews: RunningSubgraph,
    client: HttpGraphQLClient,
}

impl TestFixture {
    async fn setup() -> Self {
        let settings = SubgraphSettings::default();
        let start = |kind: SubgraphKind| {
            let settings = settings.clone();
            async move {
                let subgraph = kind.build(&settings).expect("subgraph builds");
                server::spawn(SocketAddr::from(([127, 0, 0, 1], 0)), subgraph)
                    .await
                    .expect("subgraph binds an ephemeral port")
            }
        };

        TestFixture {
            users: start(SubgraphKind::Users).await,
            movies: start(SubgraphKind::Movies).await,
            reviews: start(SubgraphKind::Reviews).await,
            client: HttpGraphQLClient::new(DEFAULT_TIMEOUT).unwrap(),
        }
    }

    async fn query(&self, service: &RunningSubgraph, query: &str, variables: Value) -> Value {
        let request = GraphQLRequest::new(query).with_variables(variables);
        self.client
            .execute(&service.url(), &request, None)
            .await
            .expect("subgraph answers")
    }

    async fn teardown(self) {
        self.users.stop().await;
        self.movies.stop().await;
        self.reviews.stop().await;
    }
}

const USER_ENTITIES: &str = r#"
query($representations: [_Any!]!) {
  _entities(representations: $representations) { ... on User { id username } }
}
"#;

const MOVIE_ENTITIES: &str = r#"
query($representations: [_Any!]!) {
  _entities(representations: $representations) { ... on Movie { id title } }
}
"#;

#[tokio::test]
#[serial]
async fn test_subgraph_queries() {
    let fixture = TestFixture::setup().await;

    // Query users
    let result = fixture.query(&fixture.users, "{ users { id username email } }", json!({})).await;
    assert_eq!(result["data"]["users"].as_array().unwrap().len(), 5);
    assert_eq!(result["data"]["users"][1]["email"], "bob@bytemonk.com");

    // Top movies keep catalogue order
    let result = fixture
        .query(&fixture.movies, "{ topMovies(limit: 2) { id title } }", json!({}))
        .await;
    assert_eq!(
        result,
        json!({
            "data": {
                "topMovies": [
                    { "id": "101", "title": "Inception" },
                    { "id": "102", "title": "The Dark Knight" }
                ]
            }
        })
    );

    // Query by id with variables
    let result = fixture
        .query(
            &fixture.movies,
            "query($id: ID!) { movie(id: $id) { title releaseYear } }",
            json!({ "id": "103" }),
        )
        .await;
    assert_eq!(result["data"]["movie"], json!({ "title": "Interstellar", "releaseYear": 2014 }));

    fixture.teardown().await;
}

#[tokio::test]
#[serial]
async fn test_reference_resolution_across_subgraphs() {
    let fixture = TestFixture::setup().await;

    // The reviews subgraph only hands out stubs for authors and movies
    let result = fixture
        .query(
            &fixture.reviews,
            r#"{ review(id: "r4") { rating author { id } movie { id averageRating } } }"#,
            json!({}),
        )
        .await;
    let review = &result["data"]["review"];
    assert_eq!(review["author"], json!({ "id": "3" }));
    assert_eq!(review["movie"], json!({ "id": "104", "averageRating": 5.0 }));

    // The owning subgraphs turn those stubs into records
    let author = json!({
        "representations": [{ "__typename": "User", "id": review["author"]["id"] }]
    });
    let users = fixture.query(&fixture.users, USER_ENTITIES, author).await;
    assert_eq!(users["data"]["_entities"], json!([{ "id": "3", "username": "charlie" }]));

    let movie = json!({
        "representations": [{ "__typename": "Movie", "id": review["movie"]["id"] }]
    });
    let movies = fixture.query(&fixture.movies, MOVIE_ENTITIES, movie).await;
    assert_eq!(movies["data"]["_entities"], json!([{ "id": "104", "title": "Pulp Fiction" }]));

    // A dangling reference is null, not an error
    let result = fixture
        .query(
            &fixture.users,
            USER_ENTITIES,
            json!({ "representations": [{ "__typename": "User", "id": "999" }] }),
        )
        .await;
    assert_eq!(result, json!({ "data": { "_entities": [null] } }));

    fixture.teardown().await;
}

#[tokio::test]
#[serial]
async fn test_create_review() {
    let fixture = TestFixture::setup().await;

    let create_review = r#"
    mutation($input: CreateReviewInput!) {
      createReview(input: $input) { id rating comment createdAt author { id } }
    }
    "#;
    let request = GraphQLRequest::new(create_review)
        .with_variables(json!({ "input": { "rating": 5, "comment": "x", "movieId": "101" } }));

    let result = fixture
        .client
        .execute(&fixture.reviews.url(), &request, Some("2"))
        .await
        .unwrap();
    let created = &result["data"]["createReview"];
    assert_eq!(created["id"], "r11");
    assert_eq!(created["author"], json!({ "id": "2" }));
    assert!(created["createdAt"].as_str().unwrap().len() == "2024-01-01".len());

    let result = fixture
        .query(&fixture.reviews, "{ recentReviews(limit: 100) { id comment } }", json!({}))
        .await;
    let reviews = result["data"]["recentReviews"].as_array().unwrap();
    assert_eq!(reviews.last().unwrap(), &json!({ "id": "r11", "comment": "x" }));

    // Average for movie 101 is now (5 + 4 + 5) / 3
    let result = fixture
        .query(&fixture.reviews, r#"{ review(id: "r11") { movie { averageRating } } }"#, json!({}))
        .await;
    assert_eq!(result["data"]["review"]["movie"]["averageRating"], 4.67);

    fixture.teardown().await;
}

#[tokio::test]
#[serial]
async fn test_malformed_requests() {
    let fixture = TestFixture::setup().await;
    let http = reqwest::Client::new();

    // Body that is not JSON
    let response = http
        .post(fixture.movies.url())
        .header("Content-Type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["errors"][0]["message"].as_str().unwrap().starts_with("Invalid JSON request"));

    // Query that does not parse: errors and no data
    let result = fixture.query(&fixture.movies, "{ movies { id ", json!({})).await;
    assert_eq!(result["data"], Value::Null);
    assert!(!result["errors"].as_array().unwrap().is_empty());

    // Query against an unknown field
    let result = fixture.query(&fixture.movies, "{ actors { id } }", json!({})).await;
    assert_eq!(result["data"], Value::Null);
    assert!(result["errors"][0]["message"].as_str().unwrap().contains("actors"));

    fixture.teardown().await;
}

#[tokio::test]
#[serial]
async fn test_http_surface() {
    let fixture = TestFixture::setup().await;
    let http = reqwest::Client::new();
    let base = format!("http://{}", fixture.users.addr);

    let health = http.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(health.status(), reqwest::StatusCode::OK);
    assert_eq!(health.text().await.unwrap(), "ok");

    let page = http.get(format!("{base}/graphql")).send().await.unwrap();
    assert!(page.text().await.unwrap().contains("GraphiQL - users subgraph"));

    let preflight = http
        .request(reqwest::Method::OPTIONS, format!("{base}/graphql"))
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.headers()["access-control-allow-origin"], "*");
    let allowed = preflight.headers()["access-control-allow-headers"].to_str().unwrap();
    assert!(allowed.contains(VIEWER_HEADER));

    // Root path serves GraphQL as well
    let response = http
        .post(format!("{base}/"))
        .header(VIEWER_HEADER, "5")
        .json(&json!({ "query": "{ me { username } }" }))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "data": { "me": { "username": "eve" } } }));

    let missing = http.get(format!("{base}/nope")).send().await.unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    fixture.teardown().await;
}

#[tokio::test]
#[serial]
async fn test_status_probes() {
    let fixture = TestFixture::setup().await;

    // Bind and release a port so nothing listens on it
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let mut targets: Vec<ProbeTarget> = [
        (SubgraphKind::Users, &fixture.users),
        (SubgraphKind::Movies, &fixture.movies),
        (SubgraphKind::Reviews, &fixture.reviews),
    ]
    .into_iter()
    .map(|(kind, running)| ProbeTarget {
        name: kind.name().to_string(),
        url: running.url(),
        query: kind.probe_query().to_string(),
    })
    .collect();
    targets.push(ProbeTarget {
        name: "router".to_string(),
        url: format!("http://{closed}/graphql"),
        query: "query { __typename }".to_string(),
    });

    let statuses = fixture.client.probe_all(targets).await;
    let online: Vec<_> = statuses.iter().map(|s| (s.name.as_str(), s.is_online())).collect();
    assert_eq!(
        online,
        vec![("users", true), ("movies", true), ("reviews", true), ("router", false)]
    );
    assert!(matches!(statuses[3].state, ServiceState::Offline(_)));

    // Executing against an offline endpoint is an error value, not a panic
    let request = GraphQLRequest::new("{ __typename }");
    assert!(
        fixture
            .client
            .execute(&format!("http://{closed}/graphql"), &request, None)
            .await
            .is_err()
    );

    fixture.teardown().await;
}

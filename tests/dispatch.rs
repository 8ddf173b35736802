use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use keel::codec::Shape;
use keel::{
    Args, Dispatcher, HandlerFault, Json, Method, RenderError, Request, Response, Router, Scalar,
    Signature, StatusCode, View,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Deserialize, Serialize, PartialEq)]
struct User {
    id: i64,
    name: String,
}

fn user_body() -> Shape {
    Shape::object().field("name", Shape::String).into()
}

async fn show_user(args: Args) -> String {
    format!("User ID: {}", args.int("id").unwrap_or_default())
}

async fn create_user(args: Args) -> Result<String, HandlerFault> {
    let name = args.body().and_then(|b| b["name"].as_str()).unwrap_or_default();
    Ok(format!("User created: {name}"))
}

async fn update_user(args: Args) -> Result<Json<User>, HandlerFault> {
    #[derive(Deserialize)]
    struct Patch {
        name: String,
    }
    let patch: Patch = args.body_as()?;
    let id = args.int("id").ok_or_else(|| HandlerFault::bad_request("id"))?;
    Ok(Json(User { id, name: patch.name }))
}

async fn search_users(args: Args) -> Json<Value> {
    Json(json!({
        "q": args.str("q"),
        "page": args.int("page"),
    }))
}

fn user_routes() -> Router {
    Router::new()
        .get("/user/{id}", Signature::new().path("id", Scalar::Integer), show_user)
        .get(
            "/user/search",
            Signature::new().query_required("q", Scalar::String).query_or("page", Scalar::Integer, "1"),
            search_users,
        )
        .post("/user", Signature::new().body("user", user_body()), create_user)
        .put(
            "/user/{id}",
            Signature::new().path("id", Scalar::Integer).body("user", user_body()),
            update_user,
        )
}

fn body_json(res: &Response) -> Value {
    serde_json::from_slice(res.body()).expect("response body is JSON")
}

fn text(res: &Response) -> &str {
    std::str::from_utf8(res.body()).expect("response body is UTF-8")
}

#[tokio::test]
async fn path_variable_scenario() {
    let dispatcher = Dispatcher::new(user_routes());
    let res = dispatcher.dispatch(Request::new(Method::Get, "/user/5")).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(text(&res), "User ID: 5");
    assert_eq!(res.header("content-type"), Some("text/plain; charset=utf-8"));
}

#[tokio::test]
async fn body_binding_scenario() {
    let dispatcher = Dispatcher::new(user_routes());
    let req = Request::new(Method::Post, "/user")
        .with_header("Content-Type", "application/json")
        .with_body(r#"{"name":"Asad"}"#);
    let res = dispatcher.dispatch(req).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(text(&res), "User created: Asad");
}

#[tokio::test]
async fn empty_required_body_is_bad_request() {
    let dispatcher = Dispatcher::new(user_routes());
    let res = dispatcher.dispatch(Request::new(Method::Put, "/user/5")).await;

    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(&res)["error"], "BadRequest");
}

#[tokio::test]
async fn missing_required_field_is_bad_request() {
    let dispatcher = Dispatcher::new(user_routes());
    let req = Request::new(Method::Post, "/user").with_body(r#"{"nick":"a"}"#);
    let res = dispatcher.dispatch(req).await;

    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    let body = body_json(&res);
    assert_eq!(body["error"], "BadRequest");
    assert!(body["message"].as_str().unwrap().contains("name"), "{body}");
}

#[tokio::test]
async fn structured_reply_is_json() {
    let dispatcher = Dispatcher::new(user_routes());
    let req = Request::new(Method::Put, "/user/9").with_body(r#"{"name":"Bo","role":"x"}"#);
    let res = dispatcher.dispatch(req).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.header("content-type"), Some("application/json"));
    let user: User = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(user, User { id: 9, name: "Bo".into() });
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let dispatcher = Dispatcher::new(user_routes());
    let res = dispatcher.dispatch(Request::new(Method::Get, "/orders/1")).await;

    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(&res)["error"], "NotFound");
}

#[tokio::test]
async fn known_path_with_other_method_is_not_allowed() {
    let dispatcher = Dispatcher::new(user_routes());
    let res = dispatcher.dispatch(Request::new(Method::Delete, "/user/5")).await;

    assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.header("allow"), Some("GET, PUT"));
    assert_eq!(body_json(&res)["error"], "MethodNotAllowed");
}

#[tokio::test]
async fn literal_route_beats_placeholder() {
    let dispatcher = Dispatcher::new(user_routes());
    let res = dispatcher
        .dispatch(Request::from_target(Method::Get, "/user/search?q=as%20ad"))
        .await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(body_json(&res), json!({"q": "as ad", "page": 1}));
}

#[tokio::test]
async fn query_problems_are_bad_requests() {
    let dispatcher = Dispatcher::new(user_routes());

    let missing = dispatcher.dispatch(Request::new(Method::Get, "/user/search")).await;
    assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);

    let wrong_type = dispatcher
        .dispatch(Request::from_target(Method::Get, "/user/search?q=a&page=two"))
        .await;
    assert_eq!(wrong_type.status_code(), StatusCode::BAD_REQUEST);
    assert!(body_json(&wrong_type)["message"].as_str().unwrap().contains("`two`"));
}

#[tokio::test]
async fn path_coercion_failure_is_bad_request() {
    let dispatcher = Dispatcher::new(user_routes());
    let res = dispatcher.dispatch(Request::new(Method::Get, "/user/abc")).await;

    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(&res)["error"], "BadRequest");
}

#[tokio::test]
async fn handler_faults_map_to_status() {
    let routes = Router::new()
        .get("/boom", Signature::new(), |_args: Args| async {
            Err::<String, _>(HandlerFault::new("database offline"))
        })
        .get("/gone", Signature::new(), |_args: Args| async {
            Err::<String, _>(HandlerFault::with_status(StatusCode::GONE, "archived"))
        });
    let dispatcher = Dispatcher::new(routes);

    let boom = dispatcher.dispatch(Request::new(Method::Get, "/boom")).await;
    assert_eq!(boom.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(&boom);
    assert_eq!(body["error"], "HandlerError");
    assert_eq!(body["message"], "Internal Server Error");

    let gone = dispatcher.dispatch(Request::new(Method::Get, "/gone")).await;
    assert_eq!(gone.status_code(), StatusCode::GONE);
    assert_eq!(body_json(&gone)["message"], "archived");
}

#[tokio::test]
async fn fault_policy_decides_status() {
    let routes = Router::new().get("/conflict", Signature::new(), |_args: Args| async {
        Err::<String, _>(HandlerFault::new("version conflict"))
    });
    let dispatcher = Dispatcher::builder()
        .fault_policy(|fault: &HandlerFault| {
            if fault.message().contains("conflict") {
                StatusCode::CONFLICT
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })
        .build(routes);

    let res = dispatcher.dispatch(Request::new(Method::Get, "/conflict")).await;
    assert_eq!(res.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn panicking_handler_is_contained() {
    let routes = Router::new().get("/panic", Signature::new(), |_args: Args| async {
        if true {
            panic!("kaboom");
        }
        "unreachable"
    });
    let dispatcher = Dispatcher::builder().expose_internal_errors(true).build(routes);

    let res = dispatcher.dispatch(Request::new(Method::Get, "/panic")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(&res);
    assert_eq!(body["error"], "HandlerError");
    assert!(body["message"].as_str().unwrap().contains("kaboom"));
}

#[tokio::test]
#[allow(unreachable_code)]
async fn handler_panicking_before_its_future_is_contained() {
    let routes = Router::new().get("/eager", Signature::new(), |_args: Args| {
        panic!("before the future");
        async { "unreachable" }
    });
    let dispatcher = Dispatcher::builder().expose_internal_errors(true).build(routes);

    let res = dispatcher.dispatch(Request::new(Method::Get, "/eager")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(&res);
    assert_eq!(body["error"], "HandlerError");
    assert!(body["message"].as_str().unwrap().contains("before the future"));
}

#[tokio::test]
async fn slow_handler_times_out() {
    let routes = Router::new().get("/slow", Signature::new(), |_args: Args| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        "late"
    });
    let dispatcher = Dispatcher::builder()
        .handler_timeout(Duration::from_millis(20))
        .build(routes);

    let res = dispatcher.dispatch(Request::new(Method::Get, "/slow")).await;
    assert_eq!(res.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(&res)["error"], "HandlerError");
}

#[tokio::test]
async fn views_go_to_the_renderer() {
    let routes = Router::new().get(
        "/profile/{name}",
        Signature::new().path("name", Scalar::String),
        |args: Args| async move { View::new("profile").with("name", args.str("name").unwrap_or_default()) },
    );
    let dispatcher = Dispatcher::builder()
        .view_renderer(|view: &View| match view.name() {
            "profile" => Ok(format!("<h1>{}</h1>", view.context()["name"].as_str().unwrap_or_default())),
            other => Err(RenderError::UnknownView(other.to_owned())),
        })
        .build(routes);

    let res = dispatcher.dispatch(Request::new(Method::Get, "/profile/asad")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));
    assert_eq!(text(&res), "<h1>asad</h1>");
}

#[tokio::test]
async fn view_without_renderer_fails() {
    let routes = Router::new().get("/home", Signature::new(), |_args: Args| async { View::new("home") });
    let dispatcher = Dispatcher::new(routes);

    let res = dispatcher.dispatch(Request::new(Method::Get, "/home")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(&res)["error"], "RenderError");
}

#[tokio::test]
async fn route_table_can_be_replaced() {
    let dispatcher = Dispatcher::new(user_routes());
    assert_eq!(
        dispatcher.dispatch(Request::new(Method::Get, "/health")).await.status_code(),
        StatusCode::NOT_FOUND,
    );

    dispatcher.replace_routes(
        Router::new().get("/health", Signature::new(), |_args: Args| async { "ok" }),
    );

    let res = dispatcher.dispatch(Request::new(Method::Get, "/health")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(text(&res), "ok");
    assert_eq!(
        dispatcher.dispatch(Request::new(Method::Get, "/user/5")).await.status_code(),
        StatusCode::NOT_FOUND,
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_are_isolated() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let routes = Router::new().get(
        "/echo/{n}",
        Signature::new().path("n", Scalar::Integer),
        move |args: Args| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                format!("{}", args.int("n").unwrap_or(-1))
            }
        },
    );
    let dispatcher = Arc::new(Dispatcher::new(routes));

    let mut tasks = tokio::task::JoinSet::new();
    for n in 0..64 {
        let dispatcher = Arc::clone(&dispatcher);
        tasks.spawn(async move {
            let res = dispatcher.dispatch(Request::new(Method::Get, format!("/echo/{n}"))).await;
            (n, String::from_utf8(res.body().to_vec()).unwrap())
        });
    }
    while let Some(joined) = tasks.join_next().await {
        let (n, body) = joined.unwrap();
        assert_eq!(body, n.to_string());
    }
    assert_eq!(hits.load(Ordering::SeqCst), 64);
}

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use trellis::prelude::*;

#[derive(Injectable)]
pub struct Logger {
    #[inject(default)]
    lines: Mutex<Vec<String>>,
}

impl Logger {
    fn log(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

#[derive(Injectable)]
pub struct Counter {
    #[inject(default)]
    hits: AtomicUsize,
}

impl Counter {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }

    fn get(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

#[derive(Injectable)]
pub struct PingController {
    logger: Arc<Logger>,
}

impl Controller for PingController {
    fn declare(routes: &mut ControllerDeclaration<Self>) {
        routes.path("ping");
        routes.get("/").handle("ping", |this, _args| async move {
            this.logger.log("ping");
            Ok::<_, HttpException>(json!({ "ok": true }))
        });
    }
}

struct DenyAll;

#[async_trait]
impl Guard for DenyAll {
    async fn can_activate(&self, _ctx: &ExecutionContext) -> GuardResult {
        Ok(false)
    }
}

#[derive(Injectable)]
pub struct SecretController {
    counter: Arc<Counter>,
}

impl Controller for SecretController {
    fn declare(routes: &mut ControllerDeclaration<Self>) {
        routes
            .get("/secret")
            .use_guard(DenyAll)
            .handle("reveal", |this, _args| async move {
                this.counter.hit();
                Ok::<_, HttpException>(json!("the cake is a lie"))
            });
    }
}

#[derive(Injectable)]
pub struct ItemsController {
    counter: Arc<Counter>,
}

impl Controller for ItemsController {
    fn declare(routes: &mut ControllerDeclaration<Self>) {
        routes.path("/items");
        routes
            .get("/:id")
            .param(ParamSpec::path("id").pipe(ParseIntPipe))
            .handle("find_one", |this, args| async move {
                this.counter.hit();
                let raw = args.value(0).cloned().unwrap_or(Value::Null);
                Ok::<_, HttpException>(json!({ "id": raw, "is_number": raw.is_number() }))
            });
    }
}

static GUARD_ORDER: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

static AUDIT_ORDER: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

struct Recorded {
    name: &'static str,
    allow: bool,
    log: &'static Mutex<Vec<&'static str>>,
}

impl Recorded {
    fn allow(name: &'static str, log: &'static Mutex<Vec<&'static str>>) -> Self {
        Self { name, allow: true, log }
    }

    fn deny(name: &'static str, log: &'static Mutex<Vec<&'static str>>) -> Self {
        Self { name, allow: false, log }
    }
}

#[async_trait]
impl Guard for Recorded {
    async fn can_activate(&self, _ctx: &ExecutionContext) -> GuardResult {
        self.log.lock().unwrap().push(self.name);
        Ok(self.allow)
    }
}

struct Abort;

#[async_trait]
impl Guard for Abort {
    async fn can_activate(&self, ctx: &ExecutionContext) -> GuardResult {
        tokio::task::yield_now().await;
        ctx.cancel();
        Ok(true)
    }
}

#[derive(Injectable)]
pub struct AdminController {
    counter: Arc<Counter>,
}

impl Controller for AdminController {
    fn declare(routes: &mut ControllerDeclaration<Self>) {
        routes
            .path("/admin")
            .use_guard(Recorded::allow("G1", &GUARD_ORDER))
            .use_guard(Recorded::deny("G2", &GUARD_ORDER));
        routes
            .delete("/users/:id")
            .use_guard(Recorded::allow("G3", &GUARD_ORDER))
            .handle("remove", |this, _args| async move {
                this.counter.hit();
                Ok::<_, HttpException>(Value::Null)
            });
    }
}

#[derive(Injectable)]
pub struct AuditController {
    counter: Arc<Counter>,
}

impl Controller for AuditController {
    fn declare(routes: &mut ControllerDeclaration<Self>) {
        routes
            .path("/audit")
            .use_guard(Recorded::allow("G1", &AUDIT_ORDER))
            .use_guard(Recorded::allow("G2", &AUDIT_ORDER));
        routes
            .get("/entries")
            .use_guard(Recorded::allow("G3", &AUDIT_ORDER))
            .handle("entries", |this, _args| async move {
                AUDIT_ORDER.lock().unwrap().push("handler");
                this.counter.hit();
                Ok::<_, HttpException>(json!([]))
            });
        routes
            .get("/abort")
            .use_guard(Abort)
            .handle("abort", |this, _args| async move {
                this.counter.hit();
                Ok::<_, HttpException>(Value::Null)
            });
    }
}

#[derive(Injectable)]
pub struct UsersController;

impl Controller for UsersController {
    fn declare(routes: &mut ControllerDeclaration<Self>) {
        routes.path("/users").set_metadata("roles", json!(["user"]));
        routes
            .get("/:id")
            .param(ParamSpec::path("id"))
            .handle("find_one", |_this, args| async move {
                let id: String = args.get(0)?;
                Ok::<_, HttpException>(json!({ "route": "by-id", "id": id }))
            });
        routes
            .get("/active")
            .handle("find_active", |_this, _args| async move {
                Ok::<_, HttpException>(json!({ "route": "active" }))
            });
        routes
            .get("/whoami")
            .param(ParamSpec::header("x-user"))
            .param(ParamSpec::query("verbose").pipe(DefaultValuePipe::new("false")).pipe(ParseBoolPipe))
            .set_metadata("roles", json!(["admin"]))
            .handle("whoami", |_this, args| async move {
                let user: Option<String> = args.get(0)?;
                let verbose: bool = args.get(1)?;
                let roles = args.context().get_metadata("roles").cloned();
                Ok::<_, HttpException>(json!({ "user": user, "verbose": verbose, "roles": roles }))
            });
        routes
            .post("/:id/avatar")
            .http_code(StatusCode::ACCEPTED)
            .handle("upload_avatar", |_this, args| async move {
                args.response().set_header(
                    HeaderName::from_static("location"),
                    HeaderValue::from_static("/avatars/1"),
                );
                Ok::<_, HttpException>(Value::Null)
            });
    }
}

#[derive(Debug, thiserror::Error)]
#[error("payment required for {0}")]
struct PaymentRequired(String);

#[derive(Injectable)]
pub struct BillingController;

impl Controller for BillingController {
    fn declare(routes: &mut ControllerDeclaration<Self>) {
        routes.path("/billing");
        routes.get("/invoice").handle("invoice", |_this, _args| async move {
            Err::<Value, _>(PaymentRequired("invoice".into()))
        });
        routes.get("/crash").handle("crash", |_this, _args| async move {
            Err::<Value, _>(std::io::Error::other("disk on fire"))
        });
    }
}

struct PaymentFilter;

impl ExceptionFilter for PaymentFilter {
    fn catch(&self, error: &PipelineError, _ctx: &ExecutionContext) -> Response {
        Response::json(StatusCode::PAYMENT_REQUIRED, json!({ "message": error.to_string() }))
    }
}

pub struct AppModule;

impl Module for AppModule {
    fn declare(module: &mut ModuleDeclaration) {
        module
            .provider(Provider::class::<Logger>())
            .provider(Provider::class::<Counter>())
            .controller::<PingController>()
            .controller::<SecretController>()
            .controller::<ItemsController>()
            .controller::<AdminController>()
            .controller::<AuditController>()
            .controller::<UsersController>()
            .controller::<BillingController>();
    }
}

fn app() -> Application {
    TrellisFactory::create::<AppModule>().unwrap()
}

#[tokio::test]
async fn test_ping_returns_ok() {
    let app = app();
    let response = app.dispatch(Request::get("/ping")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, Some(json!({ "ok": true })));
    assert_eq!(*app.get::<Logger>().unwrap().lines.lock().unwrap(), ["ping"]);
}

#[tokio::test]
async fn test_denying_guard_blocks_the_handler() {
    let app = app();
    let response = app.dispatch(Request::get("/secret")).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    let body = response.body.unwrap();
    assert_eq!(body["statusCode"], 403);
    assert_eq!(body["message"], "Forbidden resource");
    assert_eq!(app.get::<Counter>().unwrap().get(), 0);
}

#[tokio::test]
async fn test_parse_int_pipe_rejects_before_the_handler() {
    let app = app();
    let response = app.dispatch(Request::get("/items/abc")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.get::<Counter>().unwrap().get(), 0);

    let response = app.dispatch(Request::get("/items/42")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, Some(json!({ "id": 42, "is_number": true })));
    assert_eq!(app.get::<Counter>().unwrap().get(), 1);
}

#[tokio::test]
async fn test_class_guards_run_before_method_guards() {
    let app = app();
    let response = app.dispatch(Request::new(Method::DELETE, "/admin/users/1")).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(*GUARD_ORDER.lock().unwrap(), ["G1", "G2"]);
    assert_eq!(app.get::<Counter>().unwrap().get(), 0);
}

#[tokio::test]
async fn test_allowing_guards_run_in_order_before_the_handler() {
    let app = app();
    let response = app.dispatch(Request::get("/audit/entries")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(*AUDIT_ORDER.lock().unwrap(), ["G1", "G2", "G3", "handler"]);
    assert_eq!(app.get::<Counter>().unwrap().get(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_do_not_share_state() {
    let app = app();
    let (aborted, rejected, ok, avatar) = tokio::join!(
        app.dispatch(Request::get("/audit/abort")),
        app.dispatch(Request::get("/items/abc")),
        app.dispatch(Request::get("/items/7")),
        app.dispatch(Request::post("/users/1/avatar")),
    );

    assert_eq!(aborted.status.as_u16(), 499);
    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body, Some(json!({ "id": 7, "is_number": true })));
    assert!(ok.headers.get("location").is_none());
    assert_eq!(avatar.status, StatusCode::ACCEPTED);
    assert_eq!(avatar.headers["location"], "/avatars/1");
    assert_eq!(app.get::<Counter>().unwrap().get(), 1);
}

#[tokio::test]
async fn test_exact_route_beats_param_route() {
    let app = app();
    let active = app.dispatch(Request::get("/users/active")).await;
    assert_eq!(active.body, Some(json!({ "route": "active" })));

    let by_id = app.dispatch(Request::get("/users/7")).await;
    assert_eq!(by_id.body, Some(json!({ "route": "by-id", "id": "7" })));
}

#[tokio::test]
async fn test_headers_query_and_method_metadata() {
    let app = app();
    let request = Request::get("/users/whoami?verbose=true")
        .header(HeaderName::from_static("x-user"), HeaderValue::from_static("ada"));
    let response = app.dispatch(request).await;
    assert_eq!(
        response.body,
        Some(json!({ "user": "ada", "verbose": true, "roles": ["admin"] }))
    );

    let anonymous = app.dispatch(Request::get("/users/whoami")).await;
    assert_eq!(
        anonymous.body,
        Some(json!({ "user": null, "verbose": false, "roles": ["admin"] }))
    );
}

#[tokio::test]
async fn test_http_code_and_handler_headers() {
    let app = app();
    let response = app.dispatch(Request::post("/users/1/avatar")).await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.headers["location"], "/avatars/1");
    assert_eq!(response.body, None);
}

#[tokio::test]
async fn test_unfiltered_errors_are_withheld() {
    let app = app();
    let response = app.dispatch(Request::get("/billing/crash")).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body.unwrap()["message"], "Internal server error");

    let exposed = TrellisFactory::with_options(ApplicationOptions::default().expose_error_details(true))
        .bootstrap(&ModuleRef::of::<AppModule>())
        .unwrap();
    let response = exposed.dispatch(Request::get("/billing/crash")).await;
    assert_eq!(response.body.unwrap()["message"], "disk on fire");
}

#[tokio::test]
async fn test_global_filter_catches_its_type_only() {
    let mut app = app();
    app.use_global_filter(FilterBinding::new(PaymentFilter).catching::<PaymentRequired>())
        .unwrap();

    let caught = app.dispatch(Request::get("/billing/invoice")).await;
    assert_eq!(caught.status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(caught.body.unwrap()["message"], "payment required for invoice");

    let uncaught = app.dispatch(Request::get("/billing/crash")).await;
    assert_eq!(uncaught.status, StatusCode::INTERNAL_SERVER_ERROR);

    let missing = app.dispatch(Request::get("/billing/nothing")).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.body.unwrap()["message"], "Cannot GET /billing/nothing");
}

#[tokio::test]
async fn test_global_guard_runs_before_route_guards() {
    let mut app = app();
    app.use_global_guard(DenyAll);
    let response = app.dispatch(Request::get("/ping")).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert!(app.get::<Logger>().unwrap().lines.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_global_pipe_runs_before_param_pipes() {
    struct Trim;

    #[async_trait]
    impl Pipe for Trim {
        async fn transform(&self, value: Value, _metadata: &ArgumentMetadata) -> PipeResult {
            Ok(match value {
                Value::String(s) => Value::String(s.trim_start_matches('0').to_string()),
                other => other,
            })
        }
    }

    let mut app = app();
    app.use_global_pipe(Trim);
    let response = app.dispatch(Request::get("/items/0042")).await;
    assert_eq!(response.body, Some(json!({ "id": 42, "is_number": true })));
}

#[tokio::test]
async fn test_enhancers_run_against_a_bare_context() {
    let ctx = ExecutionContext::new(Request::get("/billing/invoice"));
    assert!(ctx.handler().is_none());
    assert!(!DenyAll.can_activate(&ctx).await.unwrap());

    let error: PipelineError = Box::new(PaymentRequired("invoice".into()));
    let response = PaymentFilter.catch(&error, &ctx);
    assert_eq!(response.status, StatusCode::PAYMENT_REQUIRED);
}

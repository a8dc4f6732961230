use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use trellis::prelude::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cat {
    pub id: i64,
    pub name: String,
    pub age: u8,
}

#[derive(Deserialize)]
pub struct CreateCat {
    pub name: String,
    pub age: u8,
}

#[derive(Injectable)]
pub struct CatsService {
    #[inject(default)]
    cats: Mutex<Vec<Cat>>,
}

impl CatsService {
    pub fn find_all(&self) -> Vec<Cat> {
        self.cats.lock().map(|cats| cats.clone()).unwrap_or_default()
    }

    pub fn find_one(&self, id: i64) -> Option<Cat> {
        self.find_all().into_iter().find(|cat| cat.id == id)
    }

    pub fn create(&self, input: CreateCat) -> Result<Cat, HttpException> {
        let mut cats = self
            .cats
            .lock()
            .map_err(|_| HttpException::internal("cat store is poisoned"))?;
        let cat = Cat {
            id: cats.len() as i64 + 1,
            name: input.name,
            age: input.age,
        };
        cats.push(cat.clone());
        Ok(cat)
    }
}

/// Requires `x-api-key` to match `CATS_API_KEY` when that variable is set.
#[derive(Injectable)]
pub struct ApiKeyGuard {
    config: Arc<ConfigService>,
}

#[async_trait]
impl Guard for ApiKeyGuard {
    async fn can_activate(&self, ctx: &ExecutionContext) -> GuardResult {
        let Some(expected) = self.config.get("CATS_API_KEY") else {
            return Ok(true);
        };
        match ctx.request().header_value("x-api-key") {
            Some(key) => Ok(key == expected),
            None => Err(HttpException::unauthorized("Missing API key").into()),
        }
    }
}

#[derive(Injectable)]
pub struct CatsController {
    cats: Arc<CatsService>,
}

impl Controller for CatsController {
    fn declare(routes: &mut ControllerDeclaration<Self>) {
        routes.path("/cats");

        routes.get("/").handle("find_all", |this, _args| async move {
            Ok::<_, HttpException>(this.cats.find_all())
        });

        routes
            .get("/:id")
            .param(ParamSpec::path("id").pipe(ParseIntPipe))
            .handle("find_one", |this, args| async move {
                let id: i64 = args.get(0)?;
                this.cats
                    .find_one(id)
                    .ok_or_else(|| HttpException::not_found(format!("Cat {id} not found")))
            });

        routes
            .post("/")
            .use_guard_injected::<ApiKeyGuard>()
            .param(ParamSpec::body().pipe(ValidationPipe::<CreateCat>::new()))
            .handle("create", |this, args| async move {
                let input: CreateCat = args.get(0)?;
                this.cats.create(input)
            });
    }
}

pub struct CatsModule;

impl Module for CatsModule {
    fn declare(module: &mut ModuleDeclaration) {
        module
            .import_ref(ConfigModule::for_root())
            .provider(Provider::class::<CatsService>())
            .controller::<CatsController>();
    }
}

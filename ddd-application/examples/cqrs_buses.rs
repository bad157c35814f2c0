use async_trait::async_trait;
use ddd_application::command::Command;
use ddd_application::command_bus::CommandBus;
use ddd_application::command_handler::CommandHandler;
use ddd_application::context::AppContext;
use ddd_application::error::AppError;
use ddd_application::query::Query;
use ddd_application::query_bus::QueryBus;
use ddd_application::query_handler::QueryHandler;
use ddd_application::response::Response;
use ddd_application::{CachedQueryHandler, InMemoryCache, InMemoryCommandBus, InMemoryQueryBus};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Users = Arc<Mutex<HashMap<u32, String>>>;

#[derive(Debug)]
struct CreateUser {
    id: u32,
    name: String,
}

impl Command for CreateUser {
    const NAME: &'static str = "CreateUser";
}

struct CreateUserHandler {
    users: Users,
}

#[async_trait]
impl CommandHandler<CreateUser> for CreateUserHandler {
    async fn handle(&self, _ctx: &AppContext, cmd: CreateUser) -> Result<(), AppError> {
        if cmd.name.is_empty() {
            return Err(AppError::Validation("name required".into()));
        }
        self.users.lock().unwrap().insert(cmd.id, cmd.name);
        Ok(())
    }
}

#[derive(Debug)]
struct GetUser {
    id: u32,
}

#[derive(Debug, Clone, Serialize)]
struct UserResponse {
    id: u32,
    name: String,
}

impl Response for UserResponse {}

impl Query for GetUser {
    const NAME: &'static str = "GetUser";
    type Response = UserResponse;
}

struct GetUserHandler {
    users: Users,
}

#[async_trait]
impl QueryHandler<GetUser> for GetUserHandler {
    async fn handle(&self, _ctx: &AppContext, q: GetUser) -> Result<UserResponse, AppError> {
        println!("loading user {} from store", q.id);
        let users = self.users.lock().unwrap();
        let name = users
            .get(&q.id)
            .cloned()
            .ok_or_else(|| AppError::AggregateNotFound(q.id.to_string()))?;
        Ok(UserResponse { id: q.id, name })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let users: Users = Arc::default();

    let commands = InMemoryCommandBus::new();
    commands.register::<CreateUser, _>(Arc::new(CreateUserHandler {
        users: users.clone(),
    }))?;

    // 读侧包一层缓存：第二次查询不再访问存储
    let queries = InMemoryQueryBus::new();
    let cached: CachedQueryHandler<GetUser, _, _, _> = CachedQueryHandler::builder()
        .inner(GetUserHandler {
            users: users.clone(),
        })
        .cache(Arc::new(InMemoryCache::<UserResponse>::with_prefix("users")))
        .key(|q: &GetUser| q.id.to_string())
        .ttl(Duration::from_secs(60))
        .build();
    queries.register::<GetUser, _>(Arc::new(cached))?;

    let ctx = AppContext::builder()
        .correlation_id("cor-1")
        .actor_type("user")
        .actor_id("u-1")
        .build();

    commands
        .dispatch(
            &ctx,
            CreateUser {
                id: 1,
                name: "Alice".into(),
            },
        )
        .await?;

    for _ in 0..2 {
        let user = queries.ask(&ctx, GetUser { id: 1 }).await?;
        println!("GetUser -> {}", serde_json::to_string(&user)?);
    }

    // 重复注册被拒绝
    if let Err(err) = commands.register::<CreateUser, _>(Arc::new(CreateUserHandler {
        users: users.clone(),
    })) {
        eprintln!("rejected as expected: {err}");
    }

    // 未注册的命令 -> HandlerNotFound
    #[derive(Debug)]
    struct DeleteUser;

    impl Command for DeleteUser {
        const NAME: &'static str = "DeleteUser";
    }

    if let Err(AppError::HandlerNotFound(name)) = commands.dispatch(&ctx, DeleteUser).await {
        eprintln!("no handler for command: {name}");
    }
    Ok(())
}

use crate::{
    command::Command, command_bus::CommandBus, command_handler::CommandHandler,
    context::AppContext, error::AppError,
};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::any::{Any, TypeId};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type CmdHandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

type CmdHandlerFn =
    Arc<dyn for<'a> Fn(Box<dyn Any + Send>, &'a AppContext) -> CmdHandlerFuture<'a> + Send + Sync>;

/// 基于内存的 CommandBus 实现
/// - 通过 TypeId 注册不同 Command 对应的唯一 Handler
/// - 运行时以类型擦除（Any）方式进行调度
///
/// 注册应在进程组装阶段完成；与分发并发进行的注册不在支持范围内。
pub struct InMemoryCommandBus {
    handlers: DashMap<TypeId, (&'static str, CmdHandlerFn)>,
}

impl Default for InMemoryCommandBus {
    fn default() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }
}

impl InMemoryCommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册共享的命令处理器实例；同一命令重复注册返回错误
    pub fn register<C, H>(&self, handler: Arc<H>) -> Result<(), AppError>
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        self.insert::<C>(Self::shared::<C, H>(handler))
    }

    /// 注册处理器工厂：每次分发时构造新的处理器实例
    pub fn register_factory<C, H, F>(&self, factory: F) -> Result<(), AppError>
    where
        C: Command,
        H: CommandHandler<C> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let f: CmdHandlerFn = Arc::new(move |boxed_cmd, ctx| {
            let handler = factory();

            Box::pin(async move {
                let cmd = Self::downcast::<C>(boxed_cmd)?;
                handler.handle(ctx, cmd).await
            })
        });

        self.insert::<C>(f)
    }

    /// 显式覆盖已有绑定，返回是否替换了旧的处理器
    pub fn register_override<C, H>(&self, handler: Arc<H>) -> bool
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        let replaced = self
            .handlers
            .insert(TypeId::of::<C>(), (C::NAME, Self::shared::<C, H>(handler)))
            .is_some();
        if replaced {
            tracing::warn!(command = C::NAME, "command handler overridden");
        }
        replaced
    }

    /// 获取已注册的命令名列表（只读视图）
    pub fn registered_commands(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|e| e.value().0).collect()
    }

    fn shared<C, H>(handler: Arc<H>) -> CmdHandlerFn
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        Arc::new(move |boxed_cmd, ctx| {
            let handler = handler.clone();

            Box::pin(async move {
                let cmd = Self::downcast::<C>(boxed_cmd)?;
                handler.handle(ctx, cmd).await
            })
        })
    }

    // 正常情况下 downcast 永远不会失败（键与闭包同一泛型 C）
    fn downcast<C: Command>(boxed_cmd: Box<dyn Any + Send>) -> Result<C, AppError> {
        boxed_cmd
            .downcast::<C>()
            .map(|cmd| *cmd)
            .map_err(|_| AppError::TypeMismatch {
                expected: C::NAME,
                found: "unknown",
            })
    }

    fn insert<C: Command>(&self, f: CmdHandlerFn) -> Result<(), AppError> {
        match self.handlers.entry(TypeId::of::<C>()) {
            Entry::Occupied(_) => Err(AppError::AlreadyRegisteredCommand { command: C::NAME }),
            Entry::Vacant(slot) => {
                slot.insert((C::NAME, f));
                Ok(())
            }
        }
    }
}

#[async_trait]
impl CommandBus for InMemoryCommandBus {
    #[tracing::instrument(
        skip_all,
        fields(command = C::NAME, correlation_id = ctx.correlation_id())
    )]
    async fn dispatch<C: Command>(&self, ctx: &AppContext, cmd: C) -> Result<(), AppError> {
        let Some(f) = self.handlers.get(&TypeId::of::<C>()).map(|h| h.1.clone()) else {
            tracing::error!(command = C::NAME, "no handler registered");
            return Err(AppError::HandlerNotFound(C::NAME));
        };

        (f)(Box::new(cmd), ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::task::JoinSet;

    #[derive(Debug)]
    struct Incr(usize);

    impl Command for Incr {
        const NAME: &'static str = "Incr";
    }

    #[derive(Debug)]
    struct Fail;

    impl Command for Fail {
        const NAME: &'static str = "Fail";
    }

    struct IncrHandler {
        counter: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CommandHandler<Incr> for IncrHandler {
        async fn handle(&self, _ctx: &AppContext, cmd: Incr) -> Result<(), AppError> {
            self.counter.fetch_add(cmd.0, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailHandler;

    #[async_trait]
    impl CommandHandler<Fail> for FailHandler {
        async fn handle(&self, _ctx: &AppContext, _cmd: Fail) -> Result<(), AppError> {
            Err(AppError::Validation("rejected".into()))
        }
    }

    fn incr_handler(counter: &Arc<AtomicUsize>) -> Arc<IncrHandler> {
        Arc::new(IncrHandler {
            counter: counter.clone(),
        })
    }

    #[tokio::test]
    async fn register_and_dispatch_works() {
        let bus = InMemoryCommandBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.register::<Incr, _>(incr_handler(&counter)).unwrap();

        bus.dispatch(&AppContext::default(), Incr(3)).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(bus.registered_commands(), vec!["Incr"]);
    }

    #[tokio::test]
    async fn not_found_error_when_unregistered() {
        let bus = InMemoryCommandBus::new();
        let err = bus.dispatch(&AppContext::default(), Incr(1)).await.unwrap_err();
        assert!(matches!(err, AppError::HandlerNotFound("Incr")));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn handler_error_propagates_unchanged() {
        let bus = InMemoryCommandBus::new();
        bus.register::<Fail, _>(Arc::new(FailHandler)).unwrap();

        let err = bus.dispatch(&AppContext::default(), Fail).await.unwrap_err();
        match err {
            AppError::Validation(msg) => assert_eq!(msg, "rejected"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected_and_keeps_first() {
        let bus = InMemoryCommandBus::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        bus.register::<Incr, _>(incr_handler(&first)).unwrap();

        let err = bus.register::<Incr, _>(incr_handler(&second)).unwrap_err();
        assert!(matches!(
            err,
            AppError::AlreadyRegisteredCommand { command: "Incr" }
        ));

        bus.dispatch(&AppContext::default(), Incr(1)).await.unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn explicit_override_routes_only_to_new_handler() {
        let bus = InMemoryCommandBus::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        assert!(!bus.register_override::<Incr, _>(incr_handler(&first)));
        assert!(bus.register_override::<Incr, _>(incr_handler(&second)));

        bus.dispatch(&AppContext::default(), Incr(2)).await.unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn factory_builds_a_handler_per_dispatch() {
        let bus = InMemoryCommandBus::new();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let built = built.clone();
            let counter = counter.clone();
            bus.register_factory::<Incr, _, _>(move || {
                built.fetch_add(1, Ordering::SeqCst);
                IncrHandler {
                    counter: counter.clone(),
                }
            })
            .unwrap();
        }

        let ctx = AppContext::default();
        bus.dispatch(&ctx, Incr(1)).await.unwrap();
        bus.dispatch(&ctx, Incr(1)).await.unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_dispatch_is_safe() {
        let bus = Arc::new(InMemoryCommandBus::new());
        let counter = Arc::new(AtomicUsize::new(0));
        bus.register::<Incr, _>(incr_handler(&counter)).unwrap();

        let mut set = JoinSet::new();
        for _ in 0..100 {
            let bus = bus.clone();
            set.spawn(async move { bus.dispatch(&AppContext::default(), Incr(1)).await });
        }
        while let Some(res) = set.join_next().await {
            res.unwrap().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }
}

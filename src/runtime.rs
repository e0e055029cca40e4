use std::future::Future;

use once_cell::sync::OnceCell;
use tokio::{
    runtime::Handle,
    sync::oneshot::{self, Receiver},
};

static HANDLE: OnceCell<Handle> = OnceCell::new();

/// Starts the background runtime that all network work is spawned onto.
///
/// The returned closure shuts the runtime down and joins its thread.
pub fn start() -> anyhow::Result<impl FnOnce()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .thread_name("notifview-worker")
        .enable_all()
        .build()?;

    HANDLE
        .set(rt.handle().clone())
        .map_err(|_| anyhow::anyhow!("runtime was already started"))?;

    let (tx, rx) = oneshot::channel::<()>();
    let thread = std::thread::spawn(move || {
        rt.block_on(async move {
            let _ = rx.await;
            log::debug!("runtime shutting down");
        });
    });

    Ok(move || {
        drop(tx);
        let _ = thread.join();
    })
}

// an ambient runtime (e.g. inside #[tokio::test]) wins over the global one
fn handle() -> Handle {
    Handle::try_current()
        .ok()
        .or_else(|| HANDLE.get().cloned())
        .expect("runtime initialization")
}

pub fn spawn<T>(fut: impl Future<Output = T> + Send + 'static) -> Receiver<T>
where
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    handle().spawn(async move {
        let res = fut.await;
        let _ = tx.send(res);
    });
    rx
}

pub fn blocking<T>(func: impl FnOnce() -> T + Send + 'static) -> Receiver<T>
where
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let handle = handle();
    handle.clone().spawn(async move {
        if let Ok(ok) = handle.spawn_blocking(func).await {
            let _ = tx.send(ok);
        }
    });
    rx
}

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use ulid::Ulid;

use ripple_core::app::{SessionBuilder, SessionHandle};
use ripple_core::cache::CacheView;
use ripple_core::domain::OwnerId;
use ripple_core::impls::{InMemoryStore, StoreOp};
use ripple_core::ports::{ChangeFeed, TaskStore};

/// デモ用: view のスナップショットをそのまま表示
fn render(label: &str, view: &CacheView) {
    println!(
        "[{label}] loading={} adding={} updating={} error={}",
        view.loading,
        view.adding,
        view.updating,
        view.last_error
            .as_ref()
            .map_or_else(|| "none".to_string(), |e| e.to_string()),
    );
    for task in &view.tasks {
        let mark = if task.completed { "x" } else { " " };
        println!("  [{mark}] {}  ({})", task.title, task.id);
    }
}

async fn wait_for(
    handle: &SessionHandle,
    what: &str,
    cond: impl FnMut(&CacheView) -> bool,
) -> CacheView {
    timeout(Duration::from_secs(5), handle.wait_until(cond))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // (A) 共有のインメモリストアと、同じユーザーの 2 セッションを用意
    //     （「2 つのブラウザタブ」。レイテンシ注入で optimistic 状態を観察できる）
    let store = Arc::new(InMemoryStore::new().with_latency(Duration::from_millis(120)));
    let owner = OwnerId::from_ulid(Ulid::new());

    let alice = SessionBuilder::new()
        .store(Arc::clone(&store) as Arc<dyn TaskStore>)
        .feed(Arc::clone(&store) as Arc<dyn ChangeFeed>)
        .build(owner)
        .expect("store and feed are wired")
        .spawn()
        .await
        .expect("subscribe succeeds");
    let bob = SessionBuilder::new()
        .store(Arc::clone(&store) as Arc<dyn TaskStore>)
        .feed(Arc::clone(&store) as Arc<dyn ChangeFeed>)
        .build(owner)
        .expect("store and feed are wired")
        .spawn()
        .await
        .expect("subscribe succeeds");

    wait_for(&alice, "initial load (tab A)", |v| !v.loading).await;
    wait_for(&bob, "initial load (tab B)", |v| !v.loading).await;

    // (B) タブ A がタスクを追加 → 確定前に draft-ID で即表示される
    alice.submit("Buy milk").await.expect("session alive");
    let view = wait_for(&alice, "optimistic placeholder", |v| v.tasks.len() == 1).await;
    println!("-- optimistic, before the store confirms:");
    render("tab A", &view);

    let view = wait_for(&alice, "create confirmation", |v| {
        !v.adding && !v.tasks.is_empty() && !v.tasks[0].is_draft()
    })
    .await;
    println!("-- confirmed, placeholder replaced by the durable record:");
    render("tab A", &view);
    let id = view.tasks[0].id;

    // (C) feed 経由でタブ B にも同期される
    let view = wait_for(&bob, "feed insert (tab B)", |v| {
        v.tasks.iter().any(|t| t.title == "Buy milk")
    })
    .await;
    println!("-- synced to the second session through the change feed:");
    render("tab B", &view);

    // (D) タブ B が完了にする → タブ A に反映
    bob.toggle(id).await.expect("session alive");
    let view = wait_for(&alice, "toggle via feed (tab A)", |v| {
        v.tasks.iter().any(|t| t.id == id && t.completed)
    })
    .await;
    println!("-- completed in tab B, observed in tab A:");
    render("tab A", &view);

    // (E) 失敗注入: rename がストアで失敗 → ロールバックしてエラー表示
    store.fail_next(StoreOp::Update, 1).await;
    alice.rename(id, "Buy oat milk").await.expect("session alive");
    let view = wait_for(&alice, "rename rollback", |v| v.last_error.is_some()).await;
    println!("-- rename failed at the store; title rolled back, error surfaced:");
    render("tab A", &view);

    // (F) タブ B が削除 → タブ A からも消える
    bob.remove(id).await.expect("session alive");
    let view = wait_for(&alice, "delete via feed (tab A)", |v| v.tasks.is_empty()).await;
    println!("-- removed in tab B, gone everywhere:");
    render("tab A", &view);

    alice.shutdown().await.expect("session alive");
    bob.shutdown().await.expect("session alive");
}

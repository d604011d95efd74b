use std::{rc::Rc, time::Duration};

use blocks::{BlockType, ContentBlock, DEFAULT_COUNT, DEFAULT_START_INDEX, PageRequest};
use feed::{Notice, Notifier, PersistenceGateway, ViewportOptions};
use leptos::{html::Div, prelude::*};
use leptos_router::{
    components::{Route, Router, Routes},
    hooks::use_params_map,
    path,
};
use serde_json::Value;

use scroll::InfiniteScroll;

mod api;
mod scroll;

const PAGE_SIZE: u32 = DEFAULT_COUNT;
const TOAST_DURATION: Duration = Duration::from_millis(4000);

fn main() {
    console_error_panic_hook::set_once();
    leptos::mount::mount_to_body(App);
}

#[component]
fn App() -> impl IntoView {
    let toasts = ToastNotifier::new();
    provide_context(toasts);

    view! {
        <Router>
            <main class="container mx-auto p-4 max-w-2xl">
                <Routes fallback=|| view! { <p>"Pick a curio to start exploring."</p> }>
                    <Route path=path!("/curio/:id") view=CurioFeed />
                </Routes>
            </main>
            <ToastStack toasts />
        </Router>
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Toast {
    id: u64,
    notice: Notice,
}

/// Shows notices as toasts that dismiss themselves after a few seconds.
#[derive(Clone, Copy)]
struct ToastNotifier {
    toasts: RwSignal<Vec<Toast>>,
    next_id: StoredValue<u64>,
}

impl ToastNotifier {
    fn new() -> Self {
        Self {
            toasts: RwSignal::new(Vec::new()),
            next_id: StoredValue::new(0),
        }
    }

    fn dismiss(&self, id: u64) {
        self.toasts
            .try_update(|toasts| toasts.retain(|toast| toast.id != id));
    }
}

impl Notifier for ToastNotifier {
    fn notify(&self, notice: Notice) {
        let id = self.next_id.get_value();
        self.next_id.set_value(id + 1);
        self.toasts.update(|toasts| toasts.push(Toast { id, notice }));

        let this = *self;
        set_timeout(move || this.dismiss(id), TOAST_DURATION);
    }
}

#[component]
fn ToastStack(toasts: ToastNotifier) -> impl IntoView {
    view! {
        <div class="toast toast-end">
            <For each=move || toasts.toasts.get() key=|toast| toast.id let(toast)>
                <div
                    class="alert alert-error cursor-pointer"
                    on:click=move |_| toasts.dismiss(toast.id)
                >
                    <div>
                        <h3 class="font-bold">{toast.notice.title.clone()}</h3>
                        <p class="text-sm">{toast.notice.description.clone()}</p>
                    </div>
                </div>
            </For>
        </div>
    }
}

#[component]
fn CurioFeed() -> impl IntoView {
    let params = use_params_map();
    let curio_id = Memo::new(move |_| params.read().get("id").unwrap_or_default());
    let session = api::use_session();
    let notifier = use_context::<ToastNotifier>().expect("No toast notifier provided");
    let gateway = Rc::new(PersistenceGateway::new(
        api::HttpStore::new(session),
        notifier,
    ));

    let (blocks, set_blocks) = signal(Vec::<ContentBlock>::new());
    let (next_index, set_next_index) = signal(DEFAULT_START_INDEX);
    let (has_more, set_has_more) = signal(true);

    let load_more = move || {
        let gateway = Rc::clone(&gateway);
        async move {
            let curio = curio_id.get_untracked();
            let request =
                PageRequest::new(next_index.get_untracked(), PAGE_SIZE).with("curioId", curio.as_str());

            let page = match api::generate_page(&request, &session.get_untracked()).await {
                Ok(page) => page,
                Err(e) => {
                    notifier.notify(Notice {
                        title: "Couldn't load more".to_owned(),
                        description: e.to_string(),
                    });
                    return Err(e);
                }
            };

            let fetched = page.blocks.len() as u32;
            let drafts = page
                .blocks
                .into_iter()
                .zip(request.start_index..)
                .map(|(draft, ordinal)| draft.at_position(&curio, ordinal))
                .collect();
            let saved = gateway.save_all(drafts).await;

            set_blocks.update(|blocks| blocks.extend(saved.into_iter().flatten()));
            set_next_index.set(request.next_index());
            set_has_more.set(page.has_more.unwrap_or(fetched >= PAGE_SIZE));
            Ok(())
        }
    };

    let InfiniteScroll {
        loading_more,
        trigger_ref,
    } = scroll::use_infinite_scroll(has_more.into(), load_more);

    view! {
        <div class="flex flex-col gap-4">
            <For each=move || blocks.get() key=|block| block.id.clone() let(block)>
                <BlockCard block />
            </For>

            <div node_ref=trigger_ref class="h-1"></div>

            <Show when=move || loading_more.get()>
                <div class="flex justify-center">
                    <span class="loading loading-dots loading-md"></span>
                </div>
            </Show>
            <Show when=move || !has_more.get()>
                <p class="text-center text-sm opacity-60">"That's everything for this curio."</p>
            </Show>
        </div>
    }
}

#[component]
fn BlockCard(block: ContentBlock) -> impl IntoView {
    let card_ref = NodeRef::<Div>::new();
    let revealed = scroll::use_viewport_trigger(card_ref, ViewportOptions::default(), true, |_| {});

    view! {
        <div
            node_ref=card_ref
            class="card bg-base-200 shadow transition-opacity duration-500"
            class=("opacity-100", move || revealed.get())
            class=("opacity-0", move || !revealed.get())
        >
            <div class="card-body">
                <h2 class="card-title">{block_label(block.block_type)}</h2>
                <p class="text-xs opacity-60">{block.specialist_id}</p>
                <ul class="flex flex-col gap-1">
                    {content_lines(&block.content)
                        .into_iter()
                        .map(|(label, text)| {
                            view! {
                                <li>
                                    <span class="font-semibold">{label}</span>
                                    " "
                                    {text}
                                </li>
                            }
                        })
                        .collect_view()}
                </ul>
            </div>
        </div>
    }
}

fn block_label(block_type: BlockType) -> &'static str {
    match block_type {
        BlockType::Fact => "Did you know",
        BlockType::Quiz => "Quiz time",
        BlockType::Creative => "Get creative",
        BlockType::Activity => "Try this",
        BlockType::News => "In the news",
        BlockType::FunFact => "Fun fact",
        BlockType::Mindfulness => "Take a breath",
    }
}

/// Flattens block content into label/text pairs. The shape of `content`
/// depends on the specialist, so anything that isn't text is shown as JSON.
fn content_lines(content: &Value) -> Vec<(String, String)> {
    match content {
        Value::Object(fields) => fields
            .iter()
            .map(|(key, value)| (key.clone(), plain_text(value)))
            .collect(),
        other => vec![(String::new(), plain_text(other))],
    }
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(plain_text).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

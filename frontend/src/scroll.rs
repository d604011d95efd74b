use std::{fmt::Display, future::Future, rc::Rc, time::Duration};

use feed::{Lifetime, Observer, Outcome, PaginationController, Transition, ViewportOptions, ViewportTrigger};
use leptos::{html::Div, prelude::*};
use web_sys::wasm_bindgen::{JsCast, JsValue, closure::Closure};

type EntriesCallback = Closure<dyn FnMut(js_sys::Array, web_sys::IntersectionObserver)>;

/// [`Observer`] backed by one browser `IntersectionObserver` per sentinel.
pub(crate) struct DomObserver {
    on_entry: Rc<dyn Fn(bool)>,
    active: Option<(web_sys::IntersectionObserver, EntriesCallback)>,
}

impl DomObserver {
    pub(crate) fn new(on_entry: impl Fn(bool) + 'static) -> Self {
        Self {
            on_entry: Rc::new(on_entry),
            active: None,
        }
    }
}

impl Observer for DomObserver {
    type Sentinel = web_sys::Element;
    type Root = js_sys::Object;

    fn observe(&mut self, sentinel: &web_sys::Element, options: &ViewportOptions<js_sys::Object>) {
        let on_entry = Rc::clone(&self.on_entry);
        let callback = EntriesCallback::new(
            move |entries: js_sys::Array, _observer: web_sys::IntersectionObserver| {
                for entry in entries.iter() {
                    let entry: web_sys::IntersectionObserverEntry = entry.unchecked_into();
                    on_entry(entry.is_intersecting());
                }
            },
        );

        let init = web_sys::IntersectionObserverInit::new();
        init.set_root(options.root.as_ref().map(|root| root.unchecked_ref::<web_sys::Element>()));
        init.set_root_margin(&options.root_margin.to_string());
        init.set_threshold(&JsValue::from_f64(options.threshold));

        match web_sys::IntersectionObserver::new_with_options(callback.as_ref().unchecked_ref(), &init)
        {
            Ok(observer) => {
                observer.observe(sentinel);
                self.active = Some((observer, callback));
            }
            Err(e) => leptos::logging::error!("Failed to create intersection observer: {:?}", e),
        }
    }

    fn unobserve(&mut self, sentinel: &web_sys::Element) {
        if let Some((observer, _callback)) = self.active.take() {
            observer.unobserve(sentinel);
            observer.disconnect();
        }
    }
}

/// Tracks whether the element behind `target` is in view.
///
/// `on_transition` runs for every edge. With `once` set the element is only
/// watched until it first shows up.
pub(crate) fn use_viewport_trigger(
    target: NodeRef<Div>,
    options: ViewportOptions<js_sys::Object>,
    once: bool,
    on_transition: impl Fn(Transition) + 'static,
) -> Signal<bool> {
    let (intersecting, set_intersecting) = signal(false);
    let trigger = StoredValue::new_local(None::<ViewportTrigger<DomObserver>>);

    let observer = DomObserver::new(move |is_intersecting| {
        let transition = trigger
            .try_update_value(|trigger| trigger.as_mut().map(|t| t.record(is_intersecting)))
            .flatten()
            .unwrap_or(Transition::Unchanged);
        if transition != Transition::Unchanged {
            set_intersecting.set(transition == Transition::Entered);
            on_transition(transition);
        }
    });
    trigger.set_value(Some(if once {
        ViewportTrigger::once(observer, options)
    } else {
        ViewportTrigger::new(observer, options)
    }));

    Effect::new(move |_| {
        if let Some(element) = target.get() {
            let element: web_sys::Element = element.into();
            let in_view = trigger
                .try_update_value(|trigger| {
                    trigger.as_mut().map(|trigger| {
                        trigger.attach(element);
                        trigger.is_intersecting()
                    })
                })
                .flatten()
                .unwrap_or(false);
            set_intersecting.set(in_view);
        }
    });
    on_cleanup(move || {
        let _ = trigger.try_update_value(|trigger| trigger.take());
    });

    intersecting.into()
}

#[derive(Clone, Copy)]
pub(crate) struct InfiniteScroll {
    pub(crate) loading_more: Signal<bool>,
    pub(crate) trigger_ref: NodeRef<Div>,
}

/// Time given to the page to lay out a freshly loaded batch before checking
/// whether the sentinel is still in view.
const REARM_DELAY: Duration = Duration::from_millis(100);

struct Pager<F> {
    controller: PaginationController,
    lifetime: Lifetime,
    has_more: Signal<bool>,
    in_view: ReadSignal<bool>,
    load_more: F,
}

/// Calls `load_more` whenever the `trigger_ref` sentinel comes within 200px
/// of the viewport, at most once at a time and only while `has_more` holds.
/// Loading continues while the sentinel stays in view after a page lands.
///
/// Loads still running when the calling component unmounts are abandoned.
pub(crate) fn use_infinite_scroll<F, Fut, E>(has_more: Signal<bool>, load_more: F) -> InfiniteScroll
where
    F: Fn() -> Fut + 'static,
    Fut: Future<Output = Result<(), E>> + 'static,
    E: Display + 'static,
{
    let trigger_ref = NodeRef::<Div>::new();
    let (loading_more, set_loading_more) = signal(false);
    let (in_view, set_in_view) = signal(false);

    let lifetime = Lifetime::new();
    on_cleanup({
        let lifetime = lifetime.clone();
        move || lifetime.end()
    });

    let pager = Rc::new(Pager {
        controller: PaginationController::with_listener(move |loading| {
            set_loading_more.set(loading)
        }),
        lifetime,
        has_more,
        in_view,
        load_more,
    });
    use_viewport_trigger(
        trigger_ref,
        ViewportOptions::default(),
        false,
        move |transition| {
            set_in_view.set(transition == Transition::Entered);
            request_page(Rc::clone(&pager), transition);
        },
    );

    InfiniteScroll {
        loading_more: loading_more.into(),
        trigger_ref,
    }
}

fn request_page<F, Fut, E>(pager: Rc<Pager<F>>, transition: Transition)
where
    F: Fn() -> Fut + 'static,
    Fut: Future<Output = Result<(), E>> + 'static,
    E: Display + 'static,
{
    let loader = Rc::clone(&pager);
    let load = pager.controller.on_signal_within(
        &pager.lifetime,
        transition,
        pager.has_more.get_untracked(),
        move || (loader.load_more)(),
    );
    leptos::task::spawn_local(async move {
        let outcome = load.await;
        match &outcome {
            Outcome::Failed(e) => leptos::logging::warn!("Loading more failed: {}", e),
            Outcome::InFlight => leptos::logging::debug_warn!("Load already running"),
            _ => {}
        }
        if outcome != Outcome::Loaded {
            return;
        }

        set_timeout(
            move || {
                let next = pager.controller.rearm(
                    &Outcome::Loaded,
                    pager.in_view.get_untracked(),
                    pager.has_more.get_untracked(),
                );
                if next == Transition::Entered && !pager.lifetime.is_ended() {
                    request_page(pager, next);
                }
            },
            REARM_DELAY,
        );
    });
}

use crate::context::Flags;
use crate::page::{Element, ElementHandle, Page};
use crate::registry::Status;

const NAMESPACE: &str = "selflike";

/// Namespaced attribute or class name, e.g. `__selflike_item__`.
pub fn ns(name: &str) -> String {
    format!("__{NAMESPACE}_{name}__")
}

/// Applies the visual state for `status` to the element behind `handle`.
/// `None` is the unseen baseline.
///
/// Attributes are only written when their value changes, so repeated calls
/// with the same status leave the page untouched. Returns `false` if the
/// element is no longer on the page.
pub fn reconcile(page: &Page, flags: &Flags, status: Option<Status>, handle: &ElementHandle) -> bool {
    let Some(element) = handle.upgrade() else {
        tracing::trace!("element left the page, skipping render");
        return false;
    };

    if status == Some(Status::SelfLiked) && !flags.debug() {
        render_self_like(page, &element);
    }

    let item_attr = ns("item");
    match status {
        Some(status) => set_attr_if_changed(&element, &item_attr, status.as_str()),
        None => {
            element.remove_attr(&item_attr);
        }
    }
    true
}

fn render_self_like(page: &Page, element: &Element) {
    let animated = ns("animated");
    let hidden = ns("hidden");

    if element.attr(&animated).as_deref() != Some("1") {
        set_attr_if_changed(element, &hidden, "1");
        if page.is_fully_visible(element) {
            tracing::debug!("self-liked item is visible, revealing it");
            set_attr_if_changed(element, &animated, "1");
            set_attr_if_changed(element, &hidden, "0");
        }
    }

    let medal = ns("medal");
    if element.find_descendant("svg", &medal).is_none() {
        element.append_child(&badge(page));
    }
}

fn set_attr_if_changed(element: &Element, name: &str, value: &str) {
    if element.attr(name).as_deref() != Some(value) {
        element.set_attr(name, value);
    }
}

fn badge(page: &Page) -> Element {
    let medal = ns("medal");
    let svg = page.create_element(
        "svg",
        &[
            ("viewBox", "0 0 60 168"),
            ("xmlns", "http://www.w3.org/2000/svg"),
            ("class", medal.as_str()),
        ],
    );
    let ribbon = page.create_element(
        "path",
        &[("fill", "red"), ("d", "M0 6l17-6 17 128-17 6z")],
    );
    let disc = page.create_element(
        "circle",
        &[("cx", "30"), ("cy", "145"), ("r", "23"), ("fill", "#ffd42a")],
    );
    let heart = page.create_element(
        "path",
        &[
            ("fill", "#e0245e"),
            ("d", "M36 134a7 7 0 00-6 3 7 7 0 00-12 4c0 9 10 18 12 18s12-9 12-18a7 7 0 00-6-7z"),
        ],
    );
    svg.append_child(&ribbon);
    svg.append_child(&disc);
    svg.append_child(&heart);
    svg
}

/// Adds or removes the debug marker class on `<body>`.
pub fn apply_debug_class(page: &Page, debug: bool) {
    let Some(body) = page.body() else {
        return;
    };
    let class = ns("debug");
    if debug {
        body.add_class(&class);
    } else {
        body.remove_class(&class);
    }
}

/// Inserts the stylesheet into `<head>` unless it is already there.
pub fn install_styles(page: &Page) -> bool {
    let Some(head) = page.head() else {
        return false;
    };
    let id = ns("styles");
    if head
        .descendants("style")
        .iter()
        .any(|style| style.attr("id").as_deref() == Some(id.as_str()))
    {
        return false;
    }
    let style = page.create_element("style", &[("id", id.as_str())]);
    style.append_text(&stylesheet());
    head.append_child(&style);
    true
}

fn stylesheet() -> String {
    let item = |status: Status| format!("article[{}=\"{}\"]", ns("item"), status.as_str());
    let debug = format!("body.{}", ns("debug"));
    let not_debug = format!("body:not(.{})", ns("debug"));
    let self_liked = item(Status::SelfLiked);
    let hidden = format!("[{}=\"1\"]", ns("hidden"));
    let medal = format!(".{}", ns("medal"));

    format!(
        r#"
article {{ transition-property: background-color, box-shadow, border-top !important; }}
{not_debug} {self_liked}:not({hidden}) {{ border-top: solid #ff0000 4px; border-radius: 4px; }}
{not_debug} {self_liked} {medal} {{ position: absolute; height: 95px; top: -95px; right: 40px; pointer-events: none; transition: opacity .3s ease-out; }}
{not_debug} {self_liked}:hover {medal} {{ opacity: .2; }}
{not_debug} {self_liked}:not({hidden}) {medal} {{ top: -20px; }}
{debug} {checking} {{ border-left: solid blue 4px; }}
{debug} {self_liked} {{ border-left: solid red 4px; }}
{debug} {not_self_liked} {{ border-left: solid green 4px; }}
"#,
        checking = item(Status::Checking),
        not_self_liked = item(Status::NotSelfLiked),
    )
}

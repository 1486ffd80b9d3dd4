use astrometer_frontend::AnnotatorFrontend;
use yew::prelude::*;

#[function_component(App)]
fn app() -> Html {
    let window = web_sys::window().expect("no global `window` exists");
    let document = window.document().expect("should have a document on window");
    let root = document.get_element_by_id("app");

    let config = root
        .as_ref()
        .and_then(|el| el.get_attribute("data-config"))
        .unwrap_or_else(|| "{}".to_string());

    let token = root.as_ref().and_then(|el| el.get_attribute("data-token"));

    html! {
        <AnnotatorFrontend {config} {token} />
    }
}

fn main() {
    yew::Renderer::<App>::new().render();
}

pub mod annotator_app;
pub mod web_surface;

pub use annotator_app::AnnotatorFrontend;
pub use web_surface::WebSurface;

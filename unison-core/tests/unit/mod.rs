mod divergence_policy;
mod pin_retention;
mod selection;
mod stream_window;

// In-process text and image analyzers.
//
// Everything here is synchronous and depends only on its input and static
// rule tables, except the spam analyzer's URL-reputation hook, which is
// async and best-effort.

pub mod image_meta;
pub mod profanity;
pub mod spam;

//! Built-in pipeline steps.

pub mod clean_dist;
pub mod combine_css;
pub mod combine_js;
pub mod conditional;
pub mod copy;
pub mod hash;
pub mod js_entry;
pub mod replace_code;
pub mod src;

pub use clean_dist::CleanDist;
pub use combine_css::CombineCss;
pub use combine_js::CombineJs;
pub use conditional::Conditional;
pub use copy::CopyFiles;
pub use hash::ContentHash;
pub use js_entry::JsEntry;
pub use replace_code::ReplaceCode;
pub use src::Src;

use packer_core::BuildContext;

/// Dest-relative names of every staged node under the output root, in stage order.
pub fn staged_outputs(ctx: &BuildContext) -> Vec<String> {
    ctx.stage
        .iter()
        .filter(|&id| ctx.in_dest_folder(id))
        .map(|id| ctx.relative_to_dest(id))
        .collect()
}

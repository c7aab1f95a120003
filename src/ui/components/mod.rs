mod command_input;
mod dialog;
mod input;
mod key_result;
mod search_input;

pub use command_input::{CommandEvent, CommandInput};
pub use dialog::{ConfirmDialog, ConfirmEvent, PromptDialog, PromptEvent};
pub use input::{InputResult, TextInput};
pub use key_result::KeyResult;
pub use search_input::{SearchEvent, SearchInput};

mod completion;
mod ids;
mod note;
mod progress;
mod window;

pub use ids::{ExerciseId, NoteId, ParseIdError, PlanId, ProgressId, RecordId, UserId};

pub use completion::{ProgressState, SetCompletion};
pub use note::{NoteError, NoteText, WeeklyNote};
pub use progress::{ProgressError, ProgressKey, WeeklyProgress};
pub use window::WeekWindow;

//! Terminal output helpers.

use std::sync::LazyLock;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// A green checkmark used to prefix success messages.
pub static CHECKMARK: LazyLock<String> =
    LazyLock::new(|| format!("{}", console::style("✓").green()));

/// A red cross used to prefix failure messages.
pub static CROSSMARK: LazyLock<String> =
    LazyLock::new(|| format!("{}", console::style("✗").red()));

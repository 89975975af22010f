//! Simulated user input

use serde_json::Value;

use crate::common::{Error, Result};
use crate::connection::Connection;
use crate::driver::Target;

/// Script that clicks the first element matching `selector`
pub fn click_expression(selector: &str) -> String {
    // a JSON string literal is also a valid JS string literal
    let literal = Value::String(selector.to_string()).to_string();
    format!(
        "(() => {{ const el = document.querySelector({sel}); \
         if (!el) {{ throw new Error('no element matches ' + {sel}); }} \
         el.click(); return true; }})()",
        sel = literal
    )
}

/// Click the element matching `selector` inside `target`
pub async fn click(conn: &mut Connection, target: &Target, selector: &str) -> Result<()> {
    tracing::info!("Clicking {} in {}", selector, target.url);
    conn.evaluate(target, &click_expression(selector)).await?;
    Ok(())
}

/// Click something expected to shut the application down
///
/// The application may exit before answering, so a lost connection or a
/// window that vanished mid-call counts as success.
pub async fn click_terminal(conn: &mut Connection, target: &Target, selector: &str) -> Result<()> {
    match click(conn, target, selector).await {
        Ok(()) => Ok(()),
        Err(Error::Disconnected) | Err(Error::Timeout(_)) => {
            tracing::info!("Application went away after clicking {}", selector);
            Ok(())
        }
        Err(Error::Evaluation { message, .. }) if !message.contains("no element matches") => {
            tracing::info!("Window closed while clicking {}: {}", selector, message);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

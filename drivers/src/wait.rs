/*++

Licensed under the Apache-2.0 license.

File Name:

    wait.rs

Abstract:

    File contains common functions and macros to implement wait routines.

--*/

use acr_error::AcrResult;

/// Busy-poll `predicate` until it reports completion or fails.
pub fn until_ok<F>(mut predicate: F) -> AcrResult<()>
where
    F: FnMut() -> AcrResult<bool>,
{
    while !predicate()? {}
    Ok(())
}

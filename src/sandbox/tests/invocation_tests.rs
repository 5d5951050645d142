// Copyright 2025 Eric Jingryd (tidynest@proton.me)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::BTreeMap;

use super::super::*;

fn params(entries: &[(&str, ParamValue)]) -> BTreeMap<String, ParamValue> {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

// ========================================================================
// Literal quoting
// ========================================================================

#[test]
fn test_quote_plain_value() {
    assert_eq!(quote_powershell("C:\\Temp"), "'C:\\Temp'");
    assert_eq!(quote_powershell(""), "''");
}

#[test]
fn test_quote_doubles_embedded_single_quotes() {
    assert_eq!(quote_powershell("it's"), "'it''s'");
    assert_eq!(quote_powershell("'; Remove-Item C:\\ -Recurse; '"), "'''; Remove-Item C:\\ -Recurse; '''");
}

#[test]
fn test_quote_leaves_expansion_characters_inert() {
    // Single-quoted literals never expand $ or subexpressions
    assert_eq!(quote_powershell("$(calc.exe)"), "'$(calc.exe)'");
    assert_eq!(quote_powershell("`n"), "'`n'");
}

// ========================================================================
// Structured invocation rendering
// ========================================================================

#[test]
fn test_render_named_parameters_in_name_order() {
    let line = SandboxRunner::render_invocation(
        "Get-ChildItem",
        &params(&[
            ("Path", ParamValue::from("C:\\Users")),
            ("Depth", ParamValue::Int(2)),
            ("Force", ParamValue::Switch),
        ]),
    )
    .unwrap();

    assert_eq!(line, "Get-ChildItem -Depth 2 -Force -Path 'C:\\Users'");
}

#[test]
fn test_render_booleans_use_colon_form() {
    let line = SandboxRunner::render_invocation(
        "Set-Thing",
        &params(&[("Enabled", ParamValue::Bool(false))]),
    )
    .unwrap();

    assert_eq!(line, "Set-Thing -Enabled:$false");
}

#[test]
fn test_render_hostile_value_stays_one_literal() {
    let line = SandboxRunner::render_invocation(
        "Write-Output",
        &params(&[("InputObject", ParamValue::from("x'; Invoke-Expression 'calc"))]),
    )
    .unwrap();

    assert_eq!(line, "Write-Output -InputObject 'x''; Invoke-Expression ''calc'");
}

#[test]
fn test_render_rejects_bad_parameter_names() {
    for name in ["Path; calc", "-Path", "Pa th", "", "1st", "Name$x"] {
        let result = SandboxRunner::render_invocation(
            "Get-Item",
            &params(&[(name, ParamValue::from("x"))]),
        );
        assert!(
            matches!(result, Err(SandboxError::InvalidParameter(_))),
            "Parameter name '{}' should be rejected",
            name
        );
    }
}

#[test]
fn test_render_rejects_non_finite_floats() {
    for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let result = SandboxRunner::render_invocation(
            "Start-Sleep",
            &params(&[("Seconds", ParamValue::Float(value))]),
        );
        assert!(
            matches!(result, Err(SandboxError::InvalidParameter(ref name)) if name == "Seconds"),
            "Float {} should be rejected, got {:?}",
            value,
            result
        );
    }

    let line = SandboxRunner::render_invocation(
        "Start-Sleep",
        &params(&[("Seconds", ParamValue::Float(1.5))]),
    )
    .unwrap();
    assert_eq!(line, "Start-Sleep -Seconds 1.5");
}

#[test]
fn test_render_rejects_bad_operation_names() {
    for operation in ["", "Get-Item; calc", "& calc", "Get-Item|Out-Null", "$x", "--"] {
        let result = SandboxRunner::render_invocation(operation, &BTreeMap::new());
        assert!(
            matches!(result, Err(SandboxError::InvalidOperation(_))),
            "Operation '{}' should be rejected",
            operation
        );
    }
}

#[test]
fn test_render_accepts_module_qualified_names() {
    let line = SandboxRunner::render_invocation(
        "Microsoft.PowerShell.Management.Get-Item",
        &BTreeMap::new(),
    )
    .unwrap();
    assert_eq!(line, "Microsoft.PowerShell.Management.Get-Item");
}

//! Native shim emitter: one `extern "C"` export per wrapped method plus the
//! lifecycle, print and observer helpers.

use std::fmt::{self, Write};

use crate::classify::{Category, Element, StringKind};
use crate::context::{GenContext, WrappedMethod};
use crate::emit::{local_name, param_name};

const EXPORT: &str = "extern \"C\" VTK_CSHARP_EXPORT";

/// Render the complete shim source for the main class.
pub fn emit_shim(ctx: &GenContext<'_>, methods: &[WrappedMethod]) -> Result<String, fmt::Error> {
    let mut out = String::new();
    emit_prologue(&mut out, ctx)?;
    for method in methods {
        emit_method(&mut out, ctx, method)?;
    }
    emit_lifecycle(&mut out, ctx)?;
    if ctx.is_object_base() {
        emit_print(&mut out, ctx.class_name())?;
    }
    if ctx.is_observer() {
        emit_observer_bridge(&mut out, ctx.class_name())?;
    }
    Ok(out)
}

fn emit_prologue(out: &mut String, ctx: &GenContext<'_>) -> fmt::Result {
    let class = ctx.class_name();
    writeln!(out, "// C# P/Invoke wrapper for {class} object")?;
    writeln!(out, "//")?;
    writeln!(out, "#define VTK_WRAPPING_CXX")?;
    if !ctx.is_object_base() {
        writeln!(out, "#define VTK_STREAMS_FWD_ONLY")?;
    }
    writeln!(out, "#include \"vtkABI.h\"")?;
    writeln!(out, "#include \"vtkSystemIncludes.h\"")?;
    writeln!(out, "#include \"{class}.h\"")?;
    if ctx.is_observer() {
        writeln!(out, "#include \"vtkCallbackCommand.h\"")?;
    }
    writeln!(out, "#include <cstring>")?;
    writeln!(out, "#include <string>")?;
    writeln!(out, "#include <sstream>")?;
    writeln!(out)?;
    writeln!(out, "#ifdef _WIN32")?;
    writeln!(out, "#define VTK_CSHARP_EXPORT __declspec(dllexport)")?;
    writeln!(out, "#else")?;
    writeln!(
        out,
        "#define VTK_CSHARP_EXPORT __attribute__((visibility(\"default\")))"
    )?;
    writeln!(out, "#endif")
}

// ---------------------------------------------------------------------------
// Wrapped methods
// ---------------------------------------------------------------------------

fn emit_method(out: &mut String, ctx: &GenContext<'_>, method: &WrappedMethod) -> fmt::Result {
    let class = ctx.class_name();
    let params: Vec<String> = std::iter::once("void* obj".to_string())
        .chain(
            method
                .args
                .iter()
                .enumerate()
                .map(|(i, arg)| flat_param(arg, i)),
        )
        .collect();

    writeln!(out)?;
    writeln!(
        out,
        "{EXPORT} {} {}({})",
        flat_return(&method.ret),
        ctx.symbol(method),
        params.join(", ")
    )?;
    writeln!(out, "{{")?;

    for (i, arg) in method.args.iter().enumerate() {
        emit_local(out, arg, i)?;
    }

    writeln!(out, "  {class}* op = static_cast<{class}*>(obj);")?;
    let call = format!("op->{}({})", method.name(), call_args(&method.args).join(", "));
    let const_return = method.signature.return_type.is_const;
    emit_call(out, &method.ret, const_return, &call)?;

    // copy back into non-const caller buffers
    for (i, arg) in method.args.iter().enumerate() {
        let Category::Array { element, count } = arg else {
            continue;
        };
        if method.signature.parameters[i].ty.is_const {
            continue;
        }
        let (src, dst) = (local_name(i), param_name(i));
        writeln!(
            out,
            "  for (int k = 0; k < {count}; k++) {{ {dst}[k] = {}; }}",
            to_flat_element(*element, &format!("{src}[k]"))
        )?;
    }

    emit_return(out, &method.ret, const_return)?;
    writeln!(out, "}}")
}

/// Flat parameter declaration for argument `i`.
fn flat_param(arg: &Category, i: usize) -> String {
    let id = param_name(i);
    match arg {
        Category::Void => String::new(),
        Category::Bool | Category::Enum { .. } => format!("int {id}"),
        Category::Scalar(n) => format!("{} {id}", n.flat()),
        Category::Array { element, .. } => format!("{}* {id}", element.flat()),
        Category::Object { .. } => format!("void* {id}"),
        Category::String(_) => format!("const char* {id}"),
        Category::Callback => "void* fptr, void* clientdata".to_string(),
    }
}

fn flat_return(ret: &Category) -> String {
    match ret {
        Category::Void | Category::Callback => "void".to_string(),
        Category::Bool | Category::Enum { .. } => "int".to_string(),
        Category::Scalar(n) => n.flat().to_string(),
        Category::Array { element, .. } => format!("{}*", element.flat()),
        Category::Object { .. } => "void*".to_string(),
        Category::String(_) => "const char*".to_string(),
    }
}

/// Declare the native local for argument `i` and convert the flat value
/// into it.
fn emit_local(out: &mut String, arg: &Category, i: usize) -> fmt::Result {
    let (id, temp) = (param_name(i), local_name(i));
    match arg {
        Category::Void | Category::Callback => Ok(()),
        Category::Bool => writeln!(out, "  bool {temp} = ({id} != 0);"),
        Category::Scalar(n) => {
            let native = n.native();
            writeln!(out, "  {native} {temp} = static_cast<{native}>({id});")
        }
        Category::Enum { name } => writeln!(out, "  {name} {temp} = static_cast<{name}>({id});"),
        Category::Object { class } => {
            writeln!(out, "  {class}* {temp} = static_cast<{class}*>({id});")
        }
        Category::String(StringKind::CharPtr) => {
            writeln!(out, "  char* {temp} = const_cast<char*>({id});")
        }
        Category::String(_) => {
            writeln!(out, "  std::string {temp} = ({id} ? {id} : \"\");")
        }
        Category::Array { element, count } => {
            writeln!(out, "  {} {temp}[{count}];", element.native())?;
            writeln!(
                out,
                "  for (int k = 0; k < {count}; k++) {{ {temp}[k] = {}; }}",
                to_native_element(*element, &format!("{id}[k]"))
            )
        }
    }
}

fn call_args(args: &[Category]) -> Vec<String> {
    args.iter()
        .enumerate()
        .map(|(i, arg)| match arg {
            Category::Callback => {
                "reinterpret_cast<void (*)(void*)>(fptr), clientdata".to_string()
            }
            _ => local_name(i),
        })
        .collect()
}

fn emit_call(out: &mut String, ret: &Category, const_return: bool, call: &str) -> fmt::Result {
    match ret {
        Category::Void | Category::Callback => writeln!(out, "  {call};"),
        Category::Bool => writeln!(out, "  bool result = {call};"),
        Category::Scalar(n) => writeln!(out, "  {} result = {call};", n.native()),
        Category::Enum { name } => writeln!(out, "  {name} result = {call};"),
        Category::Object { class } if const_return => {
            writeln!(out, "  const {class}* result = {call};")
        }
        Category::Object { class } => writeln!(out, "  {class}* result = {call};"),
        Category::String(StringKind::CharPtr) => writeln!(out, "  const char* result = {call};"),
        Category::String(StringKind::StdStringRef) => {
            writeln!(out, "  const std::string& result = {call};")
        }
        Category::String(StringKind::StdString) => {
            writeln!(out, "  static thread_local std::string result;")?;
            writeln!(out, "  result = {call};")
        }
        Category::Array { element, .. } => {
            writeln!(out, "  const {}* result = {call};", element.native())
        }
    }
}

fn emit_return(out: &mut String, ret: &Category, const_return: bool) -> fmt::Result {
    match ret {
        Category::Void | Category::Callback => Ok(()),
        Category::Bool => writeln!(out, "  return result ? 1 : 0;"),
        Category::Scalar(n) => writeln!(out, "  return static_cast<{}>(result);", n.flat()),
        Category::Enum { .. } => writeln!(out, "  return static_cast<int>(result);"),
        Category::Object { class } if const_return => writeln!(
            out,
            "  return static_cast<void*>(const_cast<{class}*>(result));"
        ),
        Category::Object { .. } => writeln!(out, "  return static_cast<void*>(result);"),
        Category::String(StringKind::CharPtr) => writeln!(out, "  return result;"),
        Category::String(_) => writeln!(out, "  return result.c_str();"),
        Category::Array { element, count } => {
            let flat = element.flat();
            writeln!(out, "  if (!result) {{ return nullptr; }}")?;
            writeln!(out, "  static thread_local {flat} buffer[{count}];")?;
            writeln!(
                out,
                "  for (int k = 0; k < {count}; k++) {{ buffer[k] = {}; }}",
                to_flat_element(*element, "result[k]")
            )?;
            writeln!(out, "  return buffer;")
        }
    }
}

fn to_native_element(element: Element, value: &str) -> String {
    match element {
        Element::Bool => format!("({value} != 0)"),
        Element::Numeric(n) => format!("static_cast<{}>({value})", n.native()),
    }
}

fn to_flat_element(element: Element, value: &str) -> String {
    match element {
        Element::Bool => format!("({value} ? 1 : 0)"),
        Element::Numeric(n) => format!("static_cast<{}>({value})", n.flat_element()),
    }
}

// ---------------------------------------------------------------------------
// Lifecycle, print and observer helpers
// ---------------------------------------------------------------------------

fn emit_lifecycle(out: &mut String, ctx: &GenContext<'_>) -> fmt::Result {
    let class = ctx.class_name();

    if ctx.class.introduces_lifetime() {
        writeln!(out)?;
        writeln!(out, "{EXPORT} void {class}_VTKDeleteReference(void* id)")?;
        writeln!(out, "{{")?;
        writeln!(out, "  {class}* op = static_cast<{class}*>(id);")?;
        writeln!(out, "  op->Delete();")?;
        writeln!(out, "}}")?;

        writeln!(out)?;
        writeln!(out, "{EXPORT} const char* {class}_VTKGetClassName(void* id)")?;
        writeln!(out, "{{")?;
        writeln!(out, "  if (!id) {{ return \"\"; }}")?;
        writeln!(out, "  {class}* op = static_cast<{class}*>(id);")?;
        writeln!(out, "  return op->GetClassName();")?;
        writeln!(out, "}}")?;

        writeln!(out)?;
        writeln!(out, "{EXPORT} void {class}_VTKDelete(void* obj)")?;
        writeln!(out, "{{")?;
        writeln!(out, "  {class}* op = static_cast<{class}*>(obj);")?;
        writeln!(out, "  op->Delete();")?;
        writeln!(out, "}}")?;

        writeln!(out)?;
        writeln!(out, "{EXPORT} void {class}_VTKRegister(void* obj)")?;
        writeln!(out, "{{")?;
        writeln!(out, "  {class}* op = static_cast<{class}*>(obj);")?;
        writeln!(out, "  op->Register(op);")?;
        writeln!(out, "}}")?;
    }

    if !ctx.class.is_abstract {
        writeln!(out)?;
        writeln!(out, "{EXPORT} void* {class}_New(void)")?;
        writeln!(out, "{{")?;
        writeln!(out, "  return static_cast<void*>({class}::New());")?;
        writeln!(out, "}}")?;
    }
    Ok(())
}

fn emit_print(out: &mut String, class: &str) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "{EXPORT} const char* {class}_Print(void* obj)")?;
    writeln!(out, "{{")?;
    writeln!(out, "  {class}* op = static_cast<{class}*>(obj);")?;
    writeln!(out, "  static thread_local std::string result;")?;
    writeln!(out, "  std::ostringstream stream;")?;
    writeln!(out, "  op->Print(stream);")?;
    writeln!(out, "  result = stream.str();")?;
    writeln!(out, "  return result.c_str();")?;
    writeln!(out, "}}")
}

/// The bridge forwards only the stored callback pointer; caller, event id
/// and call data are dropped, so managed callbacks take no arguments.
fn emit_observer_bridge(out: &mut String, class: &str) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "typedef void (*VtkCSharpCallbackFunc)(void* clientData);")?;
    writeln!(out)?;
    writeln!(out, "static void vtkCSharpCallbackBridge(")?;
    writeln!(
        out,
        "  vtkObject* vtkNotUsed(caller), unsigned long vtkNotUsed(eid),"
    )?;
    writeln!(out, "  void* clientData, void* vtkNotUsed(calldata))")?;
    writeln!(out, "{{")?;
    writeln!(
        out,
        "  VtkCSharpCallbackFunc func = reinterpret_cast<VtkCSharpCallbackFunc>(clientData);"
    )?;
    writeln!(out, "  if (func) {{ func(nullptr); }}")?;
    writeln!(out, "}}")?;

    writeln!(out)?;
    writeln!(out, "{EXPORT} unsigned long long {class}_AddObserverCSharp(")?;
    writeln!(out, "  void* obj, const char* event, void* callbackPtr)")?;
    writeln!(out, "{{")?;
    writeln!(out, "  {class}* op = static_cast<{class}*>(obj);")?;
    writeln!(out, "  vtkCallbackCommand* cmd = vtkCallbackCommand::New();")?;
    writeln!(out, "  cmd->SetClientData(callbackPtr);")?;
    writeln!(out, "  cmd->SetCallback(vtkCSharpCallbackBridge);")?;
    writeln!(out, "  unsigned long result = op->AddObserver(event, cmd);")?;
    writeln!(out, "  cmd->Delete();")?;
    writeln!(out, "  return static_cast<unsigned long long>(result);")?;
    writeln!(out, "}}")?;

    writeln!(out)?;
    writeln!(
        out,
        "{EXPORT} void {class}_RemoveObserverCSharp(void* obj, unsigned long long tag)"
    )?;
    writeln!(out, "{{")?;
    writeln!(out, "  {class}* op = static_cast<{class}*>(obj);")?;
    writeln!(out, "  op->RemoveObserver(static_cast<unsigned long>(tag));")?;
    writeln!(out, "}}")
}

//! Managed surface emitter: one C# class per main class, with a
//! `DllImport` and a public adapter per wrapped method, followed by the
//! handle and lifetime boilerplate.

use std::fmt::{self, Write};

use crate::classify::{Category, Element, Numeric};
use crate::context::{GenContext, WrappedMethod};
use crate::emit::param_name;

const DLL_IMPORT: &str = "[DllImport(NativeLib, CallingConvention = CallingConvention.Cdecl)]";
const MEMBER: &str = "        ";
const BODY: &str = "            ";

/// The file written when the main class produces no bindings.
pub fn emit_stub(namespace: &str) -> String {
    format!("namespace {namespace} {{ }}\n")
}

/// Render the complete managed source for the main class.
pub fn emit_surface(ctx: &GenContext<'_>, methods: &[WrappedMethod]) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let class = ctx.class_name();

    writeln!(out, "// C# wrapper for {class} object")?;
    writeln!(out, "// Generated by bnd-csharp - do not edit")?;
    writeln!(out)?;
    writeln!(out, "using System;")?;
    if ctx.is_observer() {
        writeln!(out, "using System.Collections.Generic;")?;
    }
    writeln!(out, "using System.Runtime.InteropServices;")?;
    writeln!(out)?;
    writeln!(out, "namespace {}", ctx.config.namespace)?;
    writeln!(out, "{{")?;

    let base = match ctx.class.superclasses.first() {
        Some(superclass) => superclass.as_str(),
        None if ctx.is_object_base() => "IDisposable",
        None => ctx.config.roots.object_base.as_str(),
    };
    // A root re-implements IDisposable so `using` reaches its own Dispose.
    let reimplement = if ctx.class.superclasses.is_empty() && !ctx.is_object_base() {
        ", IDisposable"
    } else {
        ""
    };
    writeln!(out, "    public class {class} : {base}{reimplement}")?;
    writeln!(out, "    {{")?;
    writeln!(
        out,
        "{MEMBER}private const string NativeLib = \"{}\";",
        ctx.config.native_lib
    )?;

    for method in methods {
        emit_method(&mut out, ctx, method)?;
    }

    if ctx.class.superclasses.is_empty() {
        emit_root_boilerplate(&mut out, ctx)?;
    } else {
        emit_derived_boilerplate(&mut out, ctx)?;
    }
    if ctx.is_object_base() {
        emit_print(&mut out, class)?;
    }
    if ctx.is_observer() {
        emit_observer(&mut out, class)?;
    }

    writeln!(out, "    }}")?;
    writeln!(out, "}}")?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Wrapped methods
// ---------------------------------------------------------------------------

fn emit_method(out: &mut String, ctx: &GenContext<'_>, method: &WrappedMethod) -> fmt::Result {
    let symbol = ctx.symbol(method);
    let import_params: Vec<String> = std::iter::once("IntPtr obj".to_string())
        .chain(
            method
                .args
                .iter()
                .enumerate()
                .map(|(i, arg)| import_param(arg, i)),
        )
        .collect();
    let public_params: Vec<String> = method
        .args
        .iter()
        .enumerate()
        .map(|(i, arg)| public_param(arg, i))
        .collect();

    writeln!(out)?;
    if method.is_callback() {
        // Native code keeps the function pointer; the delegate must outlive the call.
        writeln!(out, "{MEMBER}private Action {};", callback_field(method))?;
        writeln!(out)?;
    }
    writeln!(out, "{MEMBER}{DLL_IMPORT}")?;
    writeln!(
        out,
        "{MEMBER}private static extern {} {symbol}({});",
        import_type(&method.ret),
        import_params.join(", ")
    )?;
    writeln!(out)?;
    writeln!(
        out,
        "{MEMBER}public {} {}({})",
        public_type(&method.ret),
        method.name(),
        public_params.join(", ")
    )?;
    writeln!(out, "{MEMBER}{{")?;
    emit_body(out, method, &symbol)?;
    writeln!(out, "{MEMBER}}}")
}

fn emit_body(out: &mut String, method: &WrappedMethod, symbol: &str) -> fmt::Result {
    let mut args = vec!["Handle".to_string()];
    let mut copy_back = Vec::new();

    for (i, arg) in method.args.iter().enumerate() {
        let id = param_name(i);
        match arg {
            Category::Bool => args.push(format!("{id} ? 1 : 0")),
            Category::Scalar(Numeric::Char) => args.push(format!("(byte){id}")),
            Category::Object { .. } => {
                args.push(format!("{id} == null ? IntPtr.Zero : {id}.Handle"))
            }
            Category::Callback => {
                let field = callback_field(method);
                writeln!(out, "{BODY}{field} = {id};")?;
                args.push(format!("Marshal.GetFunctionPointerForDelegate({field})"));
                args.push("IntPtr.Zero".to_string());
            }
            Category::Array {
                element: Element::Bool,
                ..
            } => {
                let staged = format!("staged{i}");
                writeln!(
                    out,
                    "{BODY}int[] {staged} = Array.ConvertAll({id}, b => b ? 1 : 0);"
                )?;
                if !method.signature.parameters[i].ty.is_const {
                    copy_back.push(format!(
                        "for (int k = 0; k < {staged}.Length; k++) {{ {id}[k] = {staged}[k] != 0; }}"
                    ));
                }
                args.push(staged);
            }
            _ => args.push(id),
        }
    }

    let call = format!("{symbol}({})", args.join(", "));
    let ret = &method.ret;

    if ret.is_void() {
        writeln!(out, "{BODY}{call};")?;
        for line in &copy_back {
            writeln!(out, "{BODY}{line}")?;
        }
        return Ok(());
    }

    let needs_pointer = matches!(
        ret,
        Category::Object { .. } | Category::String(_) | Category::Array { .. }
    );
    let value = if needs_pointer || !copy_back.is_empty() {
        writeln!(out, "{BODY}{} temp = {call};", import_type(ret))?;
        for line in &copy_back {
            writeln!(out, "{BODY}{line}")?;
        }
        "temp".to_string()
    } else {
        call
    };

    match ret {
        Category::Object { class } => {
            writeln!(out, "{BODY}if (temp == IntPtr.Zero) {{ return null; }}")?;
            writeln!(
                out,
                "{BODY}return vtkObjectBase.OBJECT_MANAGER.GetOrCreate<{class}>(temp);"
            )
        }
        Category::String(_) => writeln!(
            out,
            "{BODY}return temp == IntPtr.Zero ? null : Marshal.PtrToStringUTF8(temp);"
        ),
        Category::Array { element, count } => {
            writeln!(out, "{BODY}if (temp == IntPtr.Zero) {{ return null; }}")?;
            match element {
                Element::Bool => {
                    writeln!(out, "{BODY}int[] raw = new int[{count}];")?;
                    writeln!(out, "{BODY}Marshal.Copy(temp, raw, 0, {count});")?;
                    writeln!(out, "{BODY}return Array.ConvertAll(raw, v => v != 0);")
                }
                Element::Numeric(n) => {
                    let elem = n.managed_element();
                    writeln!(out, "{BODY}{elem}[] result = new {elem}[{count}];")?;
                    writeln!(out, "{BODY}Marshal.Copy(temp, result, 0, {count});")?;
                    writeln!(out, "{BODY}return result;")
                }
            }
        }
        Category::Bool => writeln!(out, "{BODY}return {value} != 0;"),
        Category::Scalar(Numeric::Char) => writeln!(out, "{BODY}return (char){value};"),
        _ => writeln!(out, "{BODY}return {value};"),
    }
}

/// Parameter declaration in the `DllImport`, mirroring the shim's flat
/// parameter.
fn import_param(arg: &Category, i: usize) -> String {
    let id = param_name(i);
    match arg {
        Category::Void => String::new(),
        Category::Bool | Category::Enum { .. } => format!("int {id}"),
        Category::Scalar(n) => format!("{} {id}", n.import()),
        Category::Array { element, .. } => format!("{}[] {id}", element.import()),
        Category::Object { .. } => format!("IntPtr {id}"),
        Category::String(_) => format!("[MarshalAs(UnmanagedType.LPUTF8Str)] string {id}"),
        Category::Callback => "IntPtr fptr, IntPtr clientdata".to_string(),
    }
}

fn import_type(ret: &Category) -> String {
    match ret {
        Category::Void | Category::Callback => "void".to_string(),
        Category::Bool | Category::Enum { .. } => "int".to_string(),
        Category::Scalar(n) => n.import().to_string(),
        Category::Array { .. } | Category::Object { .. } | Category::String(_) => {
            "IntPtr".to_string()
        }
    }
}

/// Parameter declaration in the public adapter.
fn public_param(arg: &Category, i: usize) -> String {
    let id = param_name(i);
    match arg {
        Category::Callback => format!("Action {id}"),
        other => format!("{} {id}", public_type(other)),
    }
}

fn public_type(ty: &Category) -> String {
    match ty {
        Category::Void => "void".to_string(),
        Category::Bool => "bool".to_string(),
        Category::Enum { .. } => "int".to_string(),
        Category::Scalar(n) => n.managed().to_string(),
        Category::Array { element, .. } => format!("{}[]", element.managed()),
        Category::Object { class } => class.clone(),
        Category::String(_) => "string".to_string(),
        Category::Callback => "Action".to_string(),
    }
}

fn callback_field(method: &WrappedMethod) -> String {
    format!("callback{}", method.sequence)
}

// ---------------------------------------------------------------------------
// Class boilerplate
// ---------------------------------------------------------------------------

/// Handle, ownership and disposal for a class without superclasses. Classes
/// other than the root object base still derive from it and pass a null
/// handle up, managing their own.
fn emit_root_boilerplate(out: &mut String, ctx: &GenContext<'_>) -> fmt::Result {
    let class = ctx.class_name();
    let is_base = ctx.is_object_base();
    let (chain, hide) = if is_base {
        ("", "")
    } else {
        (" : base(IntPtr.Zero, false)", "new ")
    };

    writeln!(out)?;
    if is_base {
        writeln!(
            out,
            "{MEMBER}internal static readonly VtkObjectManager OBJECT_MANAGER = new VtkObjectManager();"
        )?;
        writeln!(out)?;
    }
    writeln!(out, "{MEMBER}protected {hide}IntPtr handle;")?;
    writeln!(out, "{MEMBER}private bool ownsReference;")?;
    writeln!(out, "{MEMBER}private bool disposed;")?;
    writeln!(out)?;
    writeln!(out, "{MEMBER}public {hide}IntPtr Handle")?;
    writeln!(out, "{MEMBER}{{")?;
    writeln!(out, "{MEMBER}    get")?;
    writeln!(out, "{MEMBER}    {{")?;
    writeln!(
        out,
        "{MEMBER}        if (disposed) throw new ObjectDisposedException(GetType().Name);"
    )?;
    writeln!(out, "{MEMBER}        return handle;")?;
    writeln!(out, "{MEMBER}    }}")?;
    writeln!(out, "{MEMBER}}}")?;
    writeln!(out)?;

    if ctx.class.is_abstract {
        writeln!(out, "{MEMBER}protected {class}(){chain} {{ }}")?;
    } else {
        writeln!(out, "{MEMBER}{DLL_IMPORT}")?;
        writeln!(out, "{MEMBER}private static extern IntPtr {class}_New();")?;
        writeln!(out)?;
        writeln!(out, "{MEMBER}public {class}(){chain}")?;
        writeln!(out, "{MEMBER}{{")?;
        writeln!(out, "{BODY}this.handle = {class}_New();")?;
        writeln!(out, "{BODY}this.ownsReference = true;")?;
        writeln!(out, "{BODY}OBJECT_MANAGER.Register(this.handle.ToInt64(), this);")?;
        writeln!(out, "{MEMBER}}}")?;
    }
    writeln!(out)?;
    writeln!(out, "{MEMBER}internal {class}(IntPtr ptr, bool ownsRef){chain}")?;
    writeln!(out, "{MEMBER}{{")?;
    writeln!(out, "{BODY}this.handle = ptr;")?;
    writeln!(out, "{BODY}this.ownsReference = ownsRef;")?;
    writeln!(out, "{BODY}if (ptr != IntPtr.Zero)")?;
    writeln!(out, "{BODY}{{")?;
    writeln!(out, "{BODY}    OBJECT_MANAGER.Register(ptr.ToInt64(), this);")?;
    writeln!(out, "{BODY}}}")?;
    writeln!(out, "{MEMBER}}}")?;

    if ctx.class.has_delete {
        emit_dispose(out, class, hide)?;
    }
    Ok(())
}

fn emit_dispose(out: &mut String, class: &str, hide: &str) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "{MEMBER}{DLL_IMPORT}")?;
    writeln!(
        out,
        "{MEMBER}private static extern void {class}_VTKDeleteReference(IntPtr id);"
    )?;
    writeln!(out)?;
    writeln!(out, "{MEMBER}{DLL_IMPORT}")?;
    writeln!(out, "{MEMBER}private static extern void {class}_VTKRegister(IntPtr obj);")?;
    writeln!(out)?;
    writeln!(out, "{MEMBER}{DLL_IMPORT}")?;
    writeln!(
        out,
        "{MEMBER}private static extern IntPtr {class}_VTKGetClassName(IntPtr id);"
    )?;
    writeln!(out)?;
    writeln!(out, "{MEMBER}public static void VTKDeleteReference(IntPtr id)")?;
    writeln!(out, "{MEMBER}{{")?;
    writeln!(out, "{BODY}{class}_VTKDeleteReference(id);")?;
    writeln!(out, "{MEMBER}}}")?;
    writeln!(out)?;
    writeln!(out, "{MEMBER}public static void VTKRegister(IntPtr obj)")?;
    writeln!(out, "{MEMBER}{{")?;
    writeln!(out, "{BODY}{class}_VTKRegister(obj);")?;
    writeln!(out, "{MEMBER}}}")?;
    writeln!(out)?;
    writeln!(out, "{MEMBER}public static string VTKGetClassNameFromHandle(IntPtr id)")?;
    writeln!(out, "{MEMBER}{{")?;
    writeln!(out, "{BODY}IntPtr ptr = {class}_VTKGetClassName(id);")?;
    writeln!(out, "{BODY}return Marshal.PtrToStringUTF8(ptr);")?;
    writeln!(out, "{MEMBER}}}")?;
    writeln!(out)?;
    writeln!(out, "{MEMBER}public {hide}void Dispose()")?;
    writeln!(out, "{MEMBER}{{")?;
    writeln!(out, "{BODY}if (!disposed && handle != IntPtr.Zero)")?;
    writeln!(out, "{BODY}{{")?;
    writeln!(out, "{BODY}    OBJECT_MANAGER.Unregister(handle.ToInt64());")?;
    writeln!(out, "{BODY}    if (ownsReference)")?;
    writeln!(out, "{BODY}    {{")?;
    writeln!(out, "{BODY}        {class}_VTKDeleteReference(handle);")?;
    writeln!(out, "{BODY}    }}")?;
    writeln!(out, "{BODY}}}")?;
    writeln!(out, "{BODY}handle = IntPtr.Zero;")?;
    writeln!(out, "{BODY}disposed = true;")?;
    writeln!(out, "{BODY}GC.SuppressFinalize(this);")?;
    writeln!(out, "{MEMBER}}}")?;
    writeln!(out)?;
    writeln!(out, "{MEMBER}~{class}() {{ Dispose(); }}")
}

fn emit_derived_boilerplate(out: &mut String, ctx: &GenContext<'_>) -> fmt::Result {
    let class = ctx.class_name();
    writeln!(out)?;
    if ctx.class.is_abstract {
        writeln!(out, "{MEMBER}protected {class}() : base(IntPtr.Zero, false) {{ }}")?;
    } else {
        writeln!(out, "{MEMBER}{DLL_IMPORT}")?;
        writeln!(out, "{MEMBER}private static extern IntPtr {class}_New();")?;
        writeln!(out)?;
        writeln!(out, "{MEMBER}public {class}() : base({class}_New(), true) {{ }}")?;
    }
    writeln!(
        out,
        "{MEMBER}internal {class}(IntPtr ptr, bool ownsRef) : base(ptr, ownsRef) {{ }}"
    )
}

fn emit_print(out: &mut String, class: &str) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "{MEMBER}{DLL_IMPORT}")?;
    writeln!(out, "{MEMBER}private static extern IntPtr {class}_Print(IntPtr obj);")?;
    writeln!(out)?;
    writeln!(out, "{MEMBER}public string Print()")?;
    writeln!(out, "{MEMBER}{{")?;
    writeln!(out, "{BODY}IntPtr ptr = {class}_Print(Handle);")?;
    writeln!(out, "{BODY}return Marshal.PtrToStringUTF8(ptr);")?;
    writeln!(out, "{MEMBER}}}")?;
    writeln!(out)?;
    writeln!(out, "{MEMBER}public override string ToString() => Print();")
}

/// `AddObserver`/`RemoveObserver` over the shim's bridge. Registered
/// delegates stay referenced until removed so the collector cannot free a
/// callback the native side still holds.
fn emit_observer(out: &mut String, class: &str) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "{MEMBER}{DLL_IMPORT}")?;
    writeln!(out, "{MEMBER}private static extern ulong {class}_AddObserverCSharp(")?;
    writeln!(
        out,
        "{BODY}IntPtr obj, [MarshalAs(UnmanagedType.LPUTF8Str)] string eventName, IntPtr callbackPtr);"
    )?;
    writeln!(out)?;
    writeln!(out, "{MEMBER}{DLL_IMPORT}")?;
    writeln!(
        out,
        "{MEMBER}private static extern void {class}_RemoveObserverCSharp(IntPtr obj, ulong tag);"
    )?;
    writeln!(out)?;
    writeln!(out, "{MEMBER}public delegate void VtkEventCallback();")?;
    writeln!(out)?;
    writeln!(
        out,
        "{MEMBER}private readonly Dictionary<ulong, VtkEventCallback> observers ="
    )?;
    writeln!(out, "{BODY}new Dictionary<ulong, VtkEventCallback>();")?;
    writeln!(out)?;
    writeln!(
        out,
        "{MEMBER}public ulong AddObserver(string eventName, VtkEventCallback callback)"
    )?;
    writeln!(out, "{MEMBER}{{")?;
    writeln!(
        out,
        "{BODY}IntPtr fptr = Marshal.GetFunctionPointerForDelegate(callback);"
    )?;
    writeln!(
        out,
        "{BODY}ulong tag = {class}_AddObserverCSharp(Handle, eventName, fptr);"
    )?;
    writeln!(out, "{BODY}observers[tag] = callback;")?;
    writeln!(out, "{BODY}return tag;")?;
    writeln!(out, "{MEMBER}}}")?;
    writeln!(out)?;
    writeln!(out, "{MEMBER}public void RemoveObserver(ulong tag)")?;
    writeln!(out, "{MEMBER}{{")?;
    writeln!(out, "{BODY}{class}_RemoveObserverCSharp(Handle, tag);")?;
    writeln!(out, "{BODY}observers.Remove(tag);")?;
    writeln!(out, "{MEMBER}}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_is_an_empty_namespace() {
        assert_eq!(emit_stub("VTK"), "namespace VTK { }\n");
    }

    #[test]
    fn import_and_public_types_differ_where_marshalling_happens() {
        assert_eq!(import_param(&Category::Bool, 0), "int id0");
        assert_eq!(public_param(&Category::Bool, 0), "bool id0");
        assert_eq!(import_type(&Category::Scalar(Numeric::Char)), "byte");
        assert_eq!(public_type(&Category::Scalar(Numeric::Char)), "char");
        let bools = Category::Array {
            element: Element::Bool,
            count: 3,
        };
        assert_eq!(import_param(&bools, 1), "int[] id1");
        assert_eq!(public_param(&bools, 1), "bool[] id1");
        assert_eq!(import_type(&bools), "IntPtr");
        assert_eq!(public_type(&bools), "bool[]");
        assert_eq!(
            public_param(
                &Category::Object {
                    class: "vtkPoints".to_string()
                },
                0
            ),
            "vtkPoints id0"
        );
        assert_eq!(public_param(&Category::Callback, 0), "Action id0");
    }
}

//! End-to-end check of a minimal class: one getter, its own lifetime, no
//! hierarchy. Both halves must agree on every exported symbol.

use std::path::Path;
use std::sync::LazyLock;

use bnd_csharp::config::{self, Config};
use bnd_csharp::model::FileInfo;

static WIDGET: LazyLock<FileInfo> = LazyLock::new(|| {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../tests/fixtures/widget.toml");
    config::load_header(&path).expect("load widget header")
});

static WIDGET_SHIM: LazyLock<String> = LazyLock::new(|| {
    bnd_csharp::generate_shim(&WIDGET, None, &Config::default()).expect("generate widget shim")
});

static WIDGET_CS: LazyLock<String> = LazyLock::new(|| {
    bnd_csharp::generate_surface(&WIDGET, None, &Config::default())
        .expect("generate widget surface")
});

#[test]
fn shim_exports_lifecycle_and_getter() {
    for symbol in [
        "void* Widget_New(void)",
        "void Widget_VTKDeleteReference(void* id)",
        "const char* Widget_VTKGetClassName(void* id)",
        "void Widget_VTKRegister(void* obj)",
        "void Widget_VTKDelete(void* obj)",
        "int Widget_GetValue_0(void* obj)",
    ] {
        assert!(
            WIDGET_SHIM.contains(&format!("extern \"C\" VTK_CSHARP_EXPORT {symbol}")),
            "missing export `{symbol}` in:\n{}",
            *WIDGET_SHIM
        );
    }
}

#[test]
fn shim_getter_body() {
    let expected = "\
extern \"C\" VTK_CSHARP_EXPORT int Widget_GetValue_0(void* obj)
{
  Widget* op = static_cast<Widget*>(obj);
  int result = op->GetValue();
  return static_cast<int>(result);
}
";
    assert!(WIDGET_SHIM.contains(expected), "got:\n{}", *WIDGET_SHIM);
}

#[test]
fn shim_skips_constructor_named_method() {
    // `Widget` itself is constructor-like, so only one numbered export exists.
    assert!(!WIDGET_SHIM.contains("Widget_Widget_"));
    assert!(!WIDGET_SHIM.contains("Widget_GetValue_1"));
}

#[test]
fn shim_prologue() {
    assert!(WIDGET_SHIM.starts_with("// C# P/Invoke wrapper for Widget object\n"));
    assert!(WIDGET_SHIM.contains("#define VTK_STREAMS_FWD_ONLY\n"));
    assert!(WIDGET_SHIM.contains("#include \"Widget.h\"\n"));
    assert!(!WIDGET_SHIM.contains("vtkCallbackCommand.h"));
    assert!(WIDGET_SHIM.contains("#define VTK_CSHARP_EXPORT __declspec(dllexport)"));
}

#[test]
fn surface_class_derives_from_object_base() {
    assert!(WIDGET_CS.contains("namespace VTK\n{\n"));
    assert!(WIDGET_CS.contains("    public class Widget : vtkObjectBase, IDisposable\n"));
    assert!(WIDGET_CS.contains("private const string NativeLib = \"vtkCommonCoreCSharp\";"));
}

#[test]
fn surface_getter_forwards_to_export() {
    let expected = "\
        [DllImport(NativeLib, CallingConvention = CallingConvention.Cdecl)]
        private static extern int Widget_GetValue_0(IntPtr obj);

        public int GetValue()
        {
            return Widget_GetValue_0(Handle);
        }
";
    assert!(WIDGET_CS.contains(expected), "got:\n{}", *WIDGET_CS);
}

#[test]
fn surface_constructs_and_disposes() {
    let cs = &*WIDGET_CS;
    assert!(cs.contains("private static extern IntPtr Widget_New();"));
    assert!(cs.contains("public Widget() : base(IntPtr.Zero, false)\n"));
    assert!(cs.contains("this.handle = Widget_New();"));
    assert!(cs.contains("this.ownsReference = true;"));
    assert!(cs.contains("OBJECT_MANAGER.Register(this.handle.ToInt64(), this);"));
    assert!(cs.contains("internal Widget(IntPtr ptr, bool ownsRef) : base(IntPtr.Zero, false)"));
    assert!(cs.contains("public new IntPtr Handle"));
    assert!(cs.contains("        protected new IntPtr handle;\n"));
    assert!(cs.contains("throw new ObjectDisposedException(GetType().Name);"));
    assert!(cs.contains("private static extern void Widget_VTKDeleteReference(IntPtr id);"));
    assert!(cs.contains("public new void Dispose()"));
    assert!(cs.contains("OBJECT_MANAGER.Unregister(handle.ToInt64());"));
    assert!(cs.contains("~Widget() { Dispose(); }"));
    // Only the object base and observer root get the extra glue.
    assert!(!cs.contains("ToString()"));
    assert!(!cs.contains("AddObserver"));
}

#[test]
fn every_import_names_a_shim_export() {
    for line in WIDGET_CS.lines() {
        let Some(rest) = line.trim().strip_prefix("private static extern ") else {
            continue;
        };
        let name = rest
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.split('(').next())
            .expect("import has a name");
        assert!(
            WIDGET_SHIM.contains(&format!(" {name}(")),
            "import `{name}` has no matching shim export"
        );
    }
}

mod common;

use common::*;
use script_bridge::{BridgeError, Context, HostObject, HostValue};

fn context_with_classes() -> Context {
    let context = Context::new().unwrap();
    let animal = animal_class();
    let dog = dog_class(&animal);
    context.set("Test", test_class()).unwrap();
    context.set("Animal", animal).unwrap();
    context.set("Dog", dog).unwrap();
    context
}

fn eval(context: &Context, source: &str) -> HostValue {
    context.eval(source).unwrap()
}

#[test]
fn test_method_hidden_and_static() {
    let context = context_with_classes();

    assert_eq!(eval(&context, "new Test().method()"), HostValue::from("thing"));
    assert_eq!(eval(&context, "Test.static_method()"), HostValue::from("static"));

    let err = context.eval("new Test().hidden_method()").unwrap_err();
    let exception = err.exception().expect("script exception");
    assert_eq!(exception.name, "TypeError");

    assert_eq!(eval(&context, "typeof new Test().hidden_method"), HostValue::from("undefined"));
    assert_eq!(eval(&context, "'hidden_method' in new Test()"), HostValue::Bool(false));
    assert_eq!(
        eval(&context, "'hidden_method' in Test.prototype"),
        HostValue::Bool(false)
    );
}

#[test]
fn test_class_name_and_string_tag() {
    let context = context_with_classes();

    assert_eq!(eval(&context, "Test.name"), HostValue::from("Test"));
    assert_eq!(eval(&context, "new Test().toString()"), HostValue::from("[object Test]"));
    assert_eq!(eval(&context, "String(new Dog('rex'))"), HostValue::from("[object Dog]"));
    assert_eq!(
        eval(&context, "new Test().constructor === Test"),
        HostValue::Bool(true)
    );
}

#[test]
fn test_methods_are_not_enumerable() {
    let context = context_with_classes();
    let value = eval(
        &context,
        "const d = Object.getOwnPropertyDescriptor(Test.prototype, 'method'); \
         [typeof d.value, d.enumerable, Object.keys(Test.prototype).length]",
    );
    assert_eq!(
        value,
        HostValue::from(vec![
            HostValue::from("function"),
            HostValue::Bool(false),
            HostValue::Int(0),
        ])
    );
}

#[test]
fn test_class_method_receives_class() {
    let context = context_with_classes();

    assert_eq!(eval(&context, "Test.class_method()"), HostValue::from("Test"));
    assert_eq!(eval(&context, "Animal.describe()"), HostValue::from("Animal"));
    // 通过子类调用时类方法看到子类
    assert_eq!(eval(&context, "Dog.describe()"), HostValue::from("Dog"));
    // 脱离接收者调用时回退到声明它的类
    assert_eq!(
        eval(&context, "const describe = Dog.describe; describe()"),
        HostValue::from("Animal")
    );
}

#[test]
fn test_inheritance() {
    let context = context_with_classes();

    assert_eq!(
        eval(&context, "new Dog('rex').speak()"),
        HostValue::from("rex makes a sound")
    );
    assert_eq!(eval(&context, "new Dog('rex').name"), HostValue::from("rex"));
    assert_eq!(eval(&context, "new Dog('rex').breed"), HostValue::from("mutt"));
    assert_eq!(
        eval(&context, "const rex = new Dog('rex'); rex.fetch(); rex.fetch()"),
        HostValue::Int(2)
    );
    assert_eq!(eval(&context, "new Dog('rex') instanceof Animal"), HostValue::Bool(true));
    assert_eq!(eval(&context, "new Animal('cat') instanceof Dog"), HostValue::Bool(false));
    assert_eq!(
        eval(&context, "Object.getPrototypeOf(Dog) === Animal"),
        HostValue::Bool(true)
    );
}

#[test]
fn test_hidden_inherited_members() {
    let context = context_with_classes();

    assert_eq!(eval(&context, "new Animal('cat').legs"), HostValue::Int(4));
    assert_eq!(eval(&context, "new Dog('rex').legs"), HostValue::Undefined);
    assert_eq!(eval(&context, "Animal.kingdom()"), HostValue::from("animalia"));
    assert_eq!(eval(&context, "Dog.kingdom"), HostValue::Undefined);
}

#[test]
fn test_receiver_check_runs_before_host_code() {
    let context = context_with_classes();
    let test = test_class().instantiate(&[]).unwrap();
    context.set("test", test.clone()).unwrap();

    let err = context.eval("test.method.call({})").unwrap_err();
    assert_eq!(err.exception().unwrap().name, "TypeError");
    assert!(err.exception().unwrap().message.contains("method"));

    let err = context
        .eval("Test.prototype.method.call(new Animal('cat'))")
        .unwrap_err();
    assert_eq!(err.exception().unwrap().name, "TypeError");

    // 没有绑定全局对象时，undefined 接收者同样被拒绝
    let err = context.eval("const m = test.method; m()").unwrap_err();
    assert_eq!(err.exception().unwrap().name, "TypeError");

    assert_eq!(test.downcast_ref::<Test>().unwrap().calls.get(), 0);

    assert_eq!(
        eval(
            &context,
            "try { test.method.call(42) } catch (e) { e instanceof TypeError }"
        ),
        HostValue::Bool(true)
    );
    assert_eq!(eval(&context, "test.method()"), HostValue::from("thing"));
    assert_eq!(test.downcast_ref::<Test>().unwrap().calls.get(), 1);
}

#[test]
fn test_base_method_accepts_subclass_receiver() {
    let context = context_with_classes();
    assert_eq!(
        eval(&context, "Animal.prototype.speak.call(new Dog('rex'))"),
        HostValue::from("rex makes a sound")
    );
}

#[test]
fn test_unconstructable_class() {
    let context = Context::new().unwrap();
    let class = script_bridge::ClassBuilder::<Test>::new("Sealed")
        .constructor(|_call| Ok(Test::default()))
        .unconstructable()
        .method("method", |_test, _call| Ok("sealed"))
        .build();
    context.set("Sealed", class.clone()).unwrap();

    let err = context.eval("new Sealed()").unwrap_err();
    let exception = err.exception().unwrap();
    assert_eq!(exception.name, "TypeError");
    assert_eq!(exception.message, "Sealed is not constructible");

    // 宿主侧同样不能实例化
    assert!(class.instantiate(&[]).is_err());
}

#[test]
fn test_constructor_arguments_are_checked() {
    let context = context_with_classes();
    let err = context.eval("new Animal(5)").unwrap_err();
    let exception = err.exception().unwrap();
    assert_eq!(exception.name, "TypeError");
    assert!(exception.message.contains("argument 0"));
}

#[test]
fn test_identity_round_trip() {
    let context = context_with_classes();
    let test = test_class().instantiate(&[]).unwrap();
    context.set("test", test.clone()).unwrap();

    assert_eq!(eval(&context, "test.me() === test"), HostValue::Bool(true));
    assert_eq!(eval(&context, "test === test.me().me()"), HostValue::Bool(true));

    match context.get("test").unwrap() {
        HostValue::Object(object) => assert!(object.ptr_eq(&test)),
        other => panic!("expected host object, got {other:?}"),
    }

    let created = eval(&context, "globalThis.made = new Dog('rex'); made");
    let again = context.get("made").unwrap();
    let (HostValue::Object(created), HostValue::Object(again)) = (created, again) else {
        panic!("expected host objects");
    };
    assert!(created.ptr_eq(&again));
    assert_eq!(created.class().name(), "Dog");
    assert_eq!(created.downcast_ref::<Animal>().unwrap().name, "rex");
}

#[test]
fn test_class_round_trip() {
    let context = context_with_classes();
    let HostValue::Class(class) = context.get("Dog").unwrap() else {
        panic!("expected a class");
    };
    assert_eq!(class.name(), "Dog");
    assert_eq!(eval(&context, "Dog === Dog"), HostValue::Bool(true));
}

#[test]
fn test_construct_from_host() {
    let context = context_with_classes();
    let dog = context.get("Dog").unwrap();
    let value = context
        .construct(&dog, &[HostValue::from("fido")])
        .unwrap();
    let object: HostObject = value.as_object().cloned().unwrap();
    assert_eq!(object.class().name(), "Dog");
    assert!(object.downcast_ref::<Dog>().is_some());
    assert!(object.downcast_ref::<Animal>().is_some());
}

#[test]
fn test_host_values_convert() {
    let context = context_with_classes();
    assert_eq!(
        eval(&context, "[1, 2.5, 'x', null, true]"),
        HostValue::from(vec![
            HostValue::Int(1),
            HostValue::Float(2.5),
            HostValue::from("x"),
            HostValue::Null,
            HostValue::Bool(true),
        ])
    );
    let dict = eval(&context, "({ a: 1, b: [2] })");
    assert_eq!(dict.get("a"), Some(&HostValue::Int(1)));
    assert_eq!(
        dict.get("b"),
        Some(&HostValue::from(vec![HostValue::Int(2)]))
    );

    let err = context.eval("Test.nope()").unwrap_err();
    assert!(matches!(err, BridgeError::Script(_)));
}

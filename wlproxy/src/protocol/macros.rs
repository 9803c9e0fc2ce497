/// Syntax:
/// ```text
/// "declare_interfaces!" "{"
///    ( "@interface" "(" <interface-name> "," <wire-name> ")" "{"
///        // Sent on drop for objects whose version is at least <version>.
///        ( "@destructor" "(" <request-name> "=" <opcode> "," "since" "=" <version> ")" ";" )?
///
///        ( "@requests" "{"
///            ( <request-name> "(" (<arg> ":" <type>),* ")" "=" <opcode>
///                ( "=>" "[" (<wire-value> ",")+ "]" )? ";" )+
///        "}" )?
///
///        // Each event gets an entry in the interface listener, a slot in
///        // "<interface-name>Handlers" and an "on_<event-name>" setter on the proxy.
///        ( "@events" "{"
///            ( <event-name> "(" (<arg> ":" ("u32" | "i32" | "String")),* ")" ";" )+
///        "}" )?
///    "}" ",")*
/// "}"
/// ```
macro_rules! declare_interfaces {
    {
        $(@interface($name : ident, $wire : literal) { $($body : tt)* }),* $(,)?
    } => {
        $(declare_interfaces!(@interface $name, $wire, $($body)*);)*
    };

    (
        @interface $name : ident, $wire : literal,
        $(@destructor($dname : ident = $dop : literal, since = $dsince : literal);)?
        $(@requests {
            $($req : ident ($($arg : ident : $aty : ty),*) = $rop : literal
                $(=> [$($value : expr),+ $(,)?])?;)+
        })?
        $(@events {
            $($ev : ident ($($earg : ident : $ety : ident),*);)+
        })?
    ) => {
        paste::paste! {
            pub struct $name;

            #[derive(Default)]
            pub struct [<$name Handlers>] {
                $($($ev: Option<Box<dyn FnMut($($ety),*)>>,)+)?
            }

            impl Interface for $name {
                type Handlers = [<$name Handlers>];

                const NAME: &'static str = $wire;
                const DESTRUCTOR: Option<Destructor> =
                    declare_interfaces!(@destructor $($dname $dop $dsince)?);

                fn listener() -> &'static Listener<Self> {
                    static LISTENER: Listener<$name> = Listener {
                        interface: $wire,
                        events: &[$($($name::[<dispatch_ $ev>]),+)?],
                    };
                    &LISTENER
                }
            }

            impl $name {
                $($(
                    #[allow(unused_mut)] // events without arguments never read
                    fn [<dispatch_ $ev>](
                        proxy: &ProxyState<Self>,
                        mut reader: WireReader<'_>,
                    ) -> parsing::Result<()> {
                        $(let $earg = declare_interfaces!(@parse_arg $ety, reader);)*
                        reader.finish()?;

                        let args: &[String] = &[$(format!("{:?}", $earg)),*];
                        log::debug!(
                            concat!("{} @ {} <- ", stringify!($ev), "({})"),
                            proxy.id(),
                            $wire,
                            args.join(", ")
                        );

                        // The slot is empty while the handler runs so it may
                        // install a replacement for itself.
                        let handler = proxy.handlers().borrow_mut().$ev.take();
                        match handler {
                            Some(mut handler) => {
                                handler($($earg),*);
                                let mut handlers = proxy.handlers().borrow_mut();
                                if handlers.$ev.is_none() {
                                    handlers.$ev = Some(handler);
                                }
                            }
                            None => log::trace!(
                                concat!("No ", stringify!($ev), " handler for {} @ {}"),
                                proxy.id(),
                                $wire
                            ),
                        }
                        Ok(())
                    }
                )+)?
            }

            impl Proxy<$name> {
                $($(
                    pub fn [<on_ $ev>](&self, handler: impl FnMut($($ety),*) + 'static) {
                        self.state().handlers().borrow_mut().$ev = Some(Box::new(handler));
                    }
                )+)?

                $($(
                    pub fn $req(&self, $($arg : $aty),*) -> Result<usize> {
                        self.send_request(stringify!($req), $rop, &[$($($value),+)?])
                    }
                )+)?
            }
        }
    };

    (@destructor) => { None };
    (@destructor $dname : ident $dop : literal $dsince : literal) => {
        Some(Destructor { request: stringify!($dname), opcode: $dop, since: $dsince })
    };

    (@parse_arg u32, $reader : ident) => { $reader.read_u32()? };
    (@parse_arg i32, $reader : ident) => { $reader.read_i32()? };
    (@parse_arg String, $reader : ident) => { $reader.read_str()? };
    (@parse_arg $other : ident, $reader : ident) => {
        compile_error!(concat!(
            "Events arguments types should be either 'u32', 'i32' or 'String', got ",
            stringify!($other)
        ))
    };
}

pub(super) use declare_interfaces;

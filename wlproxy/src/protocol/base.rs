use super::{declare_interfaces, Destructor, Interface, WireValue::*};
use crate::{
    listener::Listener,
    proxy::ProxyState,
    runtime::Handle,
    wire_format::parsing::{self, WireReader},
    Proxy, Result,
};

declare_interfaces! {
    @interface(WlCallback, "wl_callback") {
        @events { done(callback_data: u32); }
    },

    @interface(WlRegion, "wl_region") {
        @destructor(destroy = 0, since = 1);
        @requests {
            add(x: i32, y: i32, width: i32, height: i32) = 1 => [
                Int32(x), Int32(y), Int32(width), Int32(height),
            ];
            subtract(x: i32, y: i32, width: i32, height: i32) = 2 => [
                Int32(x), Int32(y), Int32(width), Int32(height),
            ];
        }
    },

    @interface(WlSurface, "wl_surface") {
        @destructor(destroy = 0, since = 1);
        @requests {
            attach(buffer: &Proxy<WlBuffer>, x: i32, y: i32) = 1 => [Uint32(buffer.id()), Int32(x), Int32(y)];
            damage(x: i32, y: i32, width: i32, height: i32) = 2 => [Int32(x), Int32(y), Int32(width), Int32(height)];
            frame(callback: &Handle) = 3 => [Uint32(callback.id())];
            set_opaque_region(region: &Proxy<WlRegion>) = 4 => [Uint32(region.id())];
            set_input_region(region: &Proxy<WlRegion>) = 5 => [Uint32(region.id())];
            commit() = 6;
            set_buffer_scale(scale: i32) = 8 => [Int32(scale)];
            damage_buffer(x: i32, y: i32, width: i32, height: i32) = 9 => [Int32(x), Int32(y), Int32(width), Int32(height)];
        }

        @events {
            enter(output: u32);
            leave(output: u32);
            preferred_buffer_scale(factor: i32);
            preferred_buffer_transform(transform: u32);
        }
    },

    // shared memory stuffs
    @interface(WlShmPool, "wl_shm_pool") {
        @destructor(destroy = 1, since = 1);
        @requests {
            create_buffer(buffer: &Handle, offset: i32, width: i32, height: i32, stride: i32, format: WlShmFormat) = 0 => [
                Uint32(buffer.id()), Int32(offset), Int32(width),
                Int32(height), Int32(stride), Uint32(format as u32),
            ];
            resize(size: i32) = 2 => [Int32(size)];
        }
    },

    // The release event tells the client the compositor no longer reads the
    // buffer contents, so the memory may be reused.
    @interface(WlBuffer, "wl_buffer") {
        @destructor(destroy = 0, since = 1);
        @events { release(); }
    },
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WlShmFormat {
    Argb8888 = 0,
    Xrgb8888 = 1,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::runtime::{objects::test::table, Runtime};

    #[test]
    fn new_ids_are_announced_by_the_parent_request() {
        let (table, stream) = table();
        let pool: Proxy<WlShmPool> =
            Proxy::new(table.clone(), table.new_object::<WlShmPool>(1)).unwrap();
        let buffer = table.new_child::<WlBuffer>(pool.handle()).unwrap();

        pool.create_buffer(&buffer, 0, 4, 2, 16, WlShmFormat::Xrgb8888)
            .unwrap();
        let buffer: Proxy<WlBuffer> = Proxy::new(table.clone(), buffer).unwrap();

        assert_eq!(buffer.version(), 1);
        assert_eq!(
            stream.requests.borrow()[0].2,
            vec![Uint32(buffer.id()), Int32(0), Int32(4), Int32(2), Int32(16), Uint32(1)]
        );
    }

    #[test]
    fn shm_pool_destroys_with_opcode_one() {
        let (table, stream) = table();
        let pool: Proxy<WlShmPool> =
            Proxy::new(table.clone(), table.new_object::<WlShmPool>(1)).unwrap();
        let object_id = pool.id();

        pool.resize(128).unwrap();
        drop(pool);

        assert_eq!(stream.count(object_id, 2), 1);
        assert_eq!(stream.count(object_id, 1), 1);
    }

    #[test]
    fn callback_done_reports_its_data() {
        let (table, _) = table();
        let surface: Proxy<WlSurface> =
            Proxy::new(table.clone(), table.new_object::<WlSurface>(4)).unwrap();
        let handle = table.new_child::<WlCallback>(surface.handle()).unwrap();
        surface.frame(&handle).unwrap();

        let callback: Proxy<WlCallback> = Proxy::new(table.clone(), handle).unwrap();
        let done = std::rc::Rc::new(std::cell::Cell::new(None));
        {
            let done = done.clone();
            callback.on_done(move |data| done.set(Some(data)));
        }

        table
            .dispatch(crate::protocol::RawMessage {
                object_id: callback.id(),
                event_id: 0,
                payload: 1234u32.to_ne_bytes().into(),
            })
            .unwrap();

        assert_eq!(done.get(), Some(1234));
        assert_eq!(table.version(callback.handle()).unwrap(), 4);
    }

    #[test]
    fn region_requests_keep_their_opcodes() {
        let (table, stream) = table();
        let region: Proxy<WlRegion> =
            Proxy::new(table.clone(), table.new_object::<WlRegion>(1)).unwrap();

        region.add(0, 0, 5, 5).unwrap();
        region.subtract(1, 1, 2, 2).unwrap();

        let opcodes: Vec<_> = stream.requests.borrow().iter().map(|r| r.1).collect();
        assert_eq!(opcodes, vec![1, 2]);
    }
}

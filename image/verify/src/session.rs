/*++

Licensed under the Apache-2.0 license.

File Name:

    session.rs

Abstract:

    Verification session: walks every staged image, verifies it, accounts
    for its bytes and scrubs everything else in the LS ucode area.

--*/

use crate::hasher::{hash_region, HashState};
use crate::revocation::{check_revocation, FalconVersionTable};
use crate::scrubber::Scrubber;
use crate::signature::{derive_key, fold_versioning, verify_signature, VERSION_BUF_SIZE};
use crate::wpr::{read_lsb_header, read_sig_groups, WprHeaderScanner};
use crate::*;
use acr_drivers::cprintln;
use acr_drivers::memory_layout::DMA_BLOCK_SIZE;
use zerocopy::AsBytes;
use zeroize::Zeroize;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum State {
    ScanNext,
    ScrubGapToHeader,
    ReadLsb,
    ScrubGapToContent,
    CheckBlData,
    VerifyIfEnabled,
    SetupProtections,
    Advance,
    Finalize,
}

/// Image being processed
struct Image {
    index: usize,
    header: WprHeader,
    lsb: Option<LsbHeader>,

    /// Section whose signature is being checked
    section: LsSection,

    skipped: bool,
}

/// Single pass over the WPR
///
/// Owns every buffer the pass needs. `run` consumes the session, so a
/// session can neither be re-entered nor run twice.
pub struct VerificationSession<'a, E: LsVerificationEnv> {
    env: E,
    policy: VerificationPolicy<'a>,
    layout: WprLayout,
    headers: ArrayVec<WprHeader, MAX_WPR_HEADERS>,
    versions: FalconVersionTable,
    buffers: ActiveBuffer<DMA_BLOCK_SIZE>,
    hash: HashState,
    scrubber: Scrubber,
    trailer: SigGroupTrailer,
    version_buf: [u8; VERSION_BUF_SIZE],
    derived_key: AesBlock,
    image: Option<Image>,
    next_index: usize,
    info: LsVerificationInfo,
}

impl<'a, E: LsVerificationEnv> VerificationSession<'a, E> {
    /// Create a new session
    ///
    /// # Arguments
    ///
    /// * `env` - Verification environment
    /// * `policy` - Verification policy
    /// * `layout` - WPR geometry
    pub fn new(env: E, policy: VerificationPolicy<'a>, layout: WprLayout) -> Self {
        Self {
            env,
            policy,
            layout,
            headers: ArrayVec::new(),
            versions: FalconVersionTable::new(),
            buffers: ActiveBuffer::new(),
            hash: HashState::new(),
            scrubber: Scrubber::new(policy.scrubs_gaps()),
            trailer: SigGroupTrailer::default(),
            version_buf: [0u8; VERSION_BUF_SIZE],
            derived_key: AesBlock::ZERO,
            image: None,
            next_index: 0,
            info: LsVerificationInfo::default(),
        }
    }

    /// Verify every staged image and scrub the LS ucode area
    ///
    /// On a per-image failure the image's code and data are zeroed and the
    /// header table, carrying the failure status, is written back before the
    /// error is returned.
    pub fn run(mut self) -> AcrResult<LsVerificationInfo> {
        cprintln!("[acr] LS verification ++");

        self.load_headers()?;

        let mut state = State::ScanNext;
        loop {
            match self.step(state) {
                Ok(Some(next)) => state = next,
                Ok(None) => break,
                Err(err) => return Err(self.fail(err)),
            }
        }

        cprintln!(
            "[acr] LS verification -- images {} cursor {}",
            self.info.images.len(),
            self.info.cursor
        );
        Ok(core::mem::take(&mut self.info))
    }

    fn step(&mut self, state: State) -> AcrResult<Option<State>> {
        let next = match state {
            State::ScanNext => self.scan_next(),
            State::ScrubGapToHeader => {
                let lsb_offset = self.current()?.header.lsb_offset();
                self.scrubber.scrub_gap(
                    &mut self.env,
                    lsb_offset,
                    LSB_HEADER_BYTE_SIZE as u32,
                )?;
                State::ReadLsb
            }
            State::ReadLsb => {
                let header = self.current()?.header;
                let table_end = self.table_end();
                let lsb = read_lsb_header(&mut self.env, &header, &self.layout, table_end)?;
                self.current_mut()?.lsb = Some(lsb);
                State::ScrubGapToContent
            }
            State::ScrubGapToContent => {
                let lsb = self.current_lsb()?;
                self.scrubber.scrub_gap(
                    &mut self.env,
                    lsb.ucode_offset(),
                    lsb.ucode_size() + lsb.data_size(),
                )?;
                State::CheckBlData
            }
            State::CheckBlData => {
                self.check_bl_data()?;
                State::VerifyIfEnabled
            }
            State::VerifyIfEnabled => {
                self.verify_image()?;
                State::SetupProtections
            }
            State::SetupProtections => {
                let falcon_id = self.current()?.header.falcon_id();
                let lsb = self.current_lsb()?;
                self.env
                    .setup_falcon_protections(falcon_id, lsb.code_range(), lsb.data_range())
                    .map_err(|_| AcrError::ACR_PROTECTION_SETUP_FAILURE)?;
                State::Advance
            }
            State::Advance => self.advance()?,
            State::Finalize => {
                self.finalize()?;
                return Ok(None);
            }
        };
        Ok(Some(next))
    }

    fn current(&self) -> AcrResult<&Image> {
        self.image
            .as_ref()
            .ok_or(AcrError::ACR_UNREACHABLE_SESSION_STATE)
    }

    fn current_mut(&mut self) -> AcrResult<&mut Image> {
        self.image
            .as_mut()
            .ok_or(AcrError::ACR_UNREACHABLE_SESSION_STATE)
    }

    fn current_lsb(&self) -> AcrResult<LsbHeader> {
        self.current()?
            .lsb
            .ok_or(AcrError::ACR_UNREACHABLE_SESSION_STATE)
    }

    /// End of the header table, sentinel included
    fn table_end(&self) -> u32 {
        let records = core::cmp::min(self.headers.len() + 1, MAX_WPR_HEADERS);
        (records * WPR_HEADER_BYTE_SIZE) as u32
    }

    fn load_headers(&mut self) -> AcrResult<()> {
        let mut seen = 0u32;
        for header in WprHeaderScanner::new(&mut self.env, self.layout) {
            let header = header?;
            let bit = 1u32 << header.falcon_id();
            if seen & bit != 0 {
                Err(AcrError::ACR_WPR_HEADER_DUPLICATE_FALCON_ID)?;
            }
            seen |= bit;
            self.headers
                .try_push(header)
                .map_err(|_| AcrError::ACR_UNREACHABLE_SESSION_STATE)?;
        }

        if self.headers.is_empty() {
            Err(AcrError::ACR_WPR_HEADER_NONE_FOUND)?;
        }

        self.versions = FalconVersionTable::from_headers(&self.headers);
        Ok(())
    }

    fn persist_headers(&mut self) -> AcrResult<()> {
        self.env.dma_write_all(self.headers.as_slice().as_bytes(), 0)?;
        if self.headers.len() < MAX_WPR_HEADERS {
            let offset = WprHeader::table_offset(self.headers.len());
            self.env
                .dma_write_all(WprHeader::sentinel().as_bytes(), offset)?;
        }
        Ok(())
    }

    fn scan_next(&mut self) -> State {
        match self.headers.get(self.next_index) {
            Some(header) => {
                cprintln!("[acr] falcon {} ++", header.falcon_id());
                self.image = Some(Image {
                    index: self.next_index,
                    header: *header,
                    lsb: None,
                    section: LsSection::Code,
                    skipped: false,
                });
                State::ScrubGapToHeader
            }
            None => State::Finalize,
        }
    }

    fn check_bl_data(&mut self) -> AcrResult<()> {
        let falcon_id = self.current()?.header.falcon_id();
        let lsb = self.current_lsb()?;
        let size = lsb.bl_data_size();
        if size == 0 {
            return Ok(());
        }

        let max_size = self
            .policy
            .bl_data_allowance(falcon_id)
            .map(|allowance| allowance.max_size)
            .ok_or(AcrError::ACR_BL_DATA_NOT_PERMITTED)?;
        if size < 4 || size > max_size || size as usize > DMA_BLOCK_SIZE {
            Err(AcrError::ACR_BL_DATA_SIZE_INVALID)?;
        }

        let blob = &mut self.buffers.pending_mut()[..size as usize];
        self.env.dma_read_exact(blob, lsb.bl_data_offset())?;
        blob[..4].copy_from_slice(&BL_DATA_HALT_MARKER.to_le_bytes());
        self.env.dma_write_all(blob, lsb.bl_data_offset())?;

        self.scrubber
            .scrub_gap(&mut self.env, lsb.bl_data_offset(), size)
    }

    fn verify_image(&mut self) -> AcrResult<()> {
        let falcon_id = self.current()?.header.falcon_id();
        let lsb = self.current_lsb()?;

        if !self.policy.verify_signatures {
            self.current_mut()?.skipped = true;
            return Ok(());
        }

        let sig = *lsb.signature();
        if sig.falcon_id() != falcon_id {
            Err(AcrError::ACR_LSB_FALCON_ID_MISMATCH)?;
        }

        let debug = self.env.debug_mode();
        if !sig.key_present(debug) {
            if self.policy.tolerates_unsigned(falcon_id) {
                cprintln!("[acr] falcon {} unsigned, validation skipped", falcon_id);
                self.current_mut()?.skipped = true;
                return Ok(());
            }
            Err(AcrError::ACR_LS_SIGNATURE_NOT_PRESENT)?;
        }

        self.derived_key = derive_key(&mut self.env, &self.policy.master_salt, falcon_id)?;

        self.current_mut()?.section = LsSection::Code;
        self.hash.reset();
        let mut groups = read_sig_groups(&mut self.env, &lsb, &mut self.trailer)?;
        hash_region(
            &mut self.env,
            &mut self.buffers,
            &mut self.hash,
            lsb.ucode_offset(),
            lsb.ucode_size(),
            Some(&mut groups),
        )?;
        self.check_section(falcon_id, &sig, LsSection::Code, debug)?;
        groups.publish(&mut self.env, &self.derived_key, &self.hash)?;

        if lsb.data_size() != 0 {
            self.current_mut()?.section = LsSection::Data;
            self.hash.reset();
            hash_region(
                &mut self.env,
                &mut self.buffers,
                &mut self.hash,
                lsb.data_offset(),
                lsb.data_size(),
                None,
            )?;
            self.check_section(falcon_id, &sig, LsSection::Data, debug)?;
        }

        if sig.supports_versioning() != 0 {
            let header = self.current()?.header;
            check_revocation(&self.versions, &header, &sig)?;
        }

        Ok(())
    }

    fn check_section(
        &mut self,
        falcon_id: u32,
        sig: &LsbSignature,
        section: LsSection,
        debug: bool,
    ) -> AcrResult<()> {
        if sig.supports_versioning() != 0 {
            fold_versioning(
                &mut self.env,
                self.hash.global_mut(),
                sig,
                &mut self.version_buf,
            )?;
        }
        verify_signature(
            &mut self.env,
            falcon_id,
            &self.derived_key,
            self.hash.global(),
            sig.key(debug, section),
        )
    }

    fn advance(&mut self) -> AcrResult<State> {
        let image = self
            .image
            .take()
            .ok_or(AcrError::ACR_UNREACHABLE_SESSION_STATE)?;
        let status = if image.skipped {
            LsImageStatus::ValidationSkipped
        } else {
            LsImageStatus::ValidationDone
        };

        self.headers
            .get_mut(image.index)
            .ok_or(AcrError::ACR_UNREACHABLE_SESSION_STATE)?
            .set_status(status.into());
        self.info
            .images
            .try_push(LsImageInfo {
                falcon_id: image.header.falcon_id(),
                status,
                cursor: self.scrubber.cursor(),
            })
            .map_err(|_| AcrError::ACR_UNREACHABLE_SESSION_STATE)?;

        cprintln!(
            "[acr] falcon {} -- status {}",
            image.header.falcon_id(),
            u32::from(status)
        );
        self.next_index += 1;
        Ok(State::ScanNext)
    }

    fn finalize(&mut self) -> AcrResult<()> {
        if self.info.images.is_empty() {
            Err(AcrError::ACR_UNREACHABLE_NO_IMAGES)?;
        }

        self.scrubber.finish(&mut self.env, self.layout.ls_ucode_end)?;

        self.persist_headers()?;
        self.info.cursor = self.scrubber.cursor();
        Ok(())
    }

    /// Scrub the failing image, persist the header table and pick the error
    /// to report
    fn fail(&mut self, err: AcrError) -> AcrError {
        cprintln!("[acr] LS verification failed {}", u32::from(err));

        let mut cleanup = self.env.dma_wait();
        if let Some(image) = self.image.take() {
            let status = match (err.kind(), image.section) {
                (AcrErrorKind::RevocationFailure, _) => LsImageStatus::RevocationCheckFailed,
                (_, LsSection::Data) => LsImageStatus::ValidationDataFailed,
                (_, LsSection::Code) => LsImageStatus::ValidationCodeFailed,
            };
            if let Some(header) = self.headers.get_mut(image.index) {
                header.set_status(status.into());
            }
            if let Some(lsb) = image.lsb {
                let scrubbed = self.scrubber.scrub_image(&mut self.env, &lsb);
                cleanup = cleanup.and(scrubbed);
            }
        }
        let persisted = self.persist_headers();
        cleanup = cleanup.and(persisted);

        self.hash.reset();
        self.derived_key.zeroize();

        match cleanup {
            Err(cleanup_err) if !err.is_fatal() => {
                cprintln!("[acr] cleanup failed {}", u32::from(cleanup_err));
                cleanup_err
            }
            _ => err,
        }
    }
}

impl<E: LsVerificationEnv> Drop for VerificationSession<'_, E> {
    fn drop(&mut self) {
        self.derived_key.zeroize();
        self.version_buf.zeroize();
        self.buffers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::fold_blocks;
    use crate::signature::compute_signature;
    use crate::test_env::TestEnv;
    use zerocopy::FromBytes;

    const SALT: AesBlock = AesBlock([0x5A; 16]);
    const LSB_OFFSET: u32 = 0x40;
    const UCODE_OFFSET: u32 = 0x200;
    const CODE_SIZE: u32 = 0x100;
    const DATA_SIZE: u32 = 0x40;
    const BL_DATA_OFFSET: u32 = 0x380;
    const LS_UCODE_END: u32 = 0x400;
    const LAYOUT: WprLayout = WprLayout {
        ls_ucode_end: LS_UCODE_END,
    };
    const FILL: u8 = 0xCC;

    struct Fixture {
        header: WprHeader,
        lsb: LsbHeader,
        code: Vec<u8>,
        data: Vec<u8>,
        bl_data: Vec<u8>,
    }

    impl Fixture {
        fn new(falcon_id: u32) -> Self {
            let mut header = WprHeader::default();
            header
                .set_falcon_id(falcon_id)
                .set_lsb_offset(LSB_OFFSET)
                .set_bin_version(1);

            let mut lsb = LsbHeader::default();
            lsb.set_ucode_offset(UCODE_OFFSET)
                .set_ucode_size(CODE_SIZE)
                .set_data_size(DATA_SIZE);
            lsb.signature_mut()
                .set_falcon_id(falcon_id)
                .set_prd_present(1)
                .set_dbg_present(1)
                .set_version(1);

            let mut fixture = Self {
                header,
                lsb,
                code: (0..CODE_SIZE).map(|i| (i as u8) ^ 0x3C).collect(),
                data: vec![0x5E; DATA_SIZE as usize],
                bl_data: vec![],
            };
            fixture.sign();
            fixture
        }

        fn section_signature(&self, section: LsSection) -> LsSignature {
            let mut env = TestEnv::new(0);
            let sig = *self.lsb.signature();
            let bytes = match section {
                LsSection::Code => &self.code,
                LsSection::Data => &self.data,
            };
            let mut chain = AesBlock::ZERO;
            fold_blocks(&mut env, &mut chain, bytes).unwrap();
            if sig.supports_versioning() != 0 {
                let mut scratch = [0u8; VERSION_BUF_SIZE];
                fold_versioning(&mut env, &mut chain, &sig, &mut scratch).unwrap();
            }
            let key = derive_key(&mut env, &SALT, self.header.falcon_id()).unwrap();
            compute_signature(&mut env, &key, &chain).unwrap().into()
        }

        fn sign(&mut self) {
            for section in [LsSection::Code, LsSection::Data] {
                let value = self.section_signature(section);
                self.lsb.signature_mut().prd_keys_mut()[section as usize] = value;
                self.lsb.signature_mut().dbg_keys_mut()[section as usize] = value;
            }
        }

        fn stage(&self) -> TestEnv {
            let mut env = TestEnv::new(LS_UCODE_END as usize);
            env.load(0, &[FILL; LS_UCODE_END as usize]);
            env.load(0, self.header.as_bytes());
            env.load(WPR_HEADER_BYTE_SIZE, WprHeader::sentinel().as_bytes());
            env.load(LSB_OFFSET as usize, self.lsb.as_bytes());
            env.load(UCODE_OFFSET as usize, &self.code);
            env.load((UCODE_OFFSET + CODE_SIZE) as usize, &self.data);
            if !self.bl_data.is_empty() {
                env.load(BL_DATA_OFFSET as usize, &self.bl_data);
            }
            env
        }
    }

    fn run(env: &mut TestEnv, policy: VerificationPolicy) -> AcrResult<LsVerificationInfo> {
        VerificationSession::new(env, policy, LAYOUT).run()
    }

    fn persisted_header(env: &TestEnv) -> WprHeader {
        WprHeader::read_from(&env.mem()[..WPR_HEADER_BYTE_SIZE]).unwrap()
    }

    fn zeroed(env: &TestEnv, range: core::ops::Range<u32>) -> bool {
        env.mem()[range.start as usize..range.end as usize]
            .iter()
            .all(|b| *b == 0)
    }

    #[test]
    fn test_single_image_success() {
        let fixture = Fixture::new(LSF_FALCON_ID_SEC2);
        let mut env = fixture.stage();

        let info = run(&mut env, VerificationPolicy::production(SALT)).unwrap();

        assert_eq!(info.images.len(), 1);
        assert_eq!(info.images[0].falcon_id, LSF_FALCON_ID_SEC2);
        assert_eq!(info.images[0].status, LsImageStatus::ValidationDone);
        assert_eq!(info.images[0].cursor, UCODE_OFFSET + CODE_SIZE + DATA_SIZE);
        assert_eq!(info.cursor, LS_UCODE_END);

        let header = persisted_header(&env);
        assert_eq!(header.status(), LsImageStatus::ValidationDone as u32);
        assert!(WprHeader::read_from(&env.mem()[24..48]).unwrap().is_sentinel());
        assert!(zeroed(&env, 48..LSB_OFFSET));
        assert!(zeroed(&env, LSB_OFFSET + LSB_HEADER_BYTE_SIZE as u32..UCODE_OFFSET));
        assert!(zeroed(&env, UCODE_OFFSET + CODE_SIZE + DATA_SIZE..LS_UCODE_END));
        assert_eq!(
            &env.mem()[UCODE_OFFSET as usize..(UCODE_OFFSET + CODE_SIZE) as usize],
            fixture.code.as_slice()
        );
        assert_eq!(
            env.protections,
            vec![(
                LSF_FALCON_ID_SEC2,
                UCODE_OFFSET..UCODE_OFFSET + CODE_SIZE,
                UCODE_OFFSET + CODE_SIZE..UCODE_OFFSET + CODE_SIZE + DATA_SIZE
            )]
        );
        assert!(env.failures.is_empty());
        assert!(env.dma_idle());
    }

    #[test]
    fn test_code_signature_flip_scrubs_image() {
        let mut fixture = Fixture::new(LSF_FALCON_ID_FECS);
        fixture.lsb.signature_mut().prd_keys_mut()[0][7] ^= 0x80;
        let mut env = fixture.stage();

        assert_eq!(
            run(&mut env, VerificationPolicy::production(SALT)).unwrap_err(),
            AcrError::ACR_LS_SIGNATURE_MISMATCH
        );
        assert_eq!(env.failures, vec![LSF_FALCON_ID_FECS]);
        assert!(zeroed(&env, UCODE_OFFSET..UCODE_OFFSET + CODE_SIZE + DATA_SIZE));
        assert_eq!(
            env.writes
                .iter()
                .filter(|(offset, _)| *offset == UCODE_OFFSET)
                .count(),
            1
        );
        assert_eq!(
            persisted_header(&env).status(),
            LsImageStatus::ValidationCodeFailed as u32
        );
        assert!(env.protections.is_empty());
    }

    #[test]
    fn test_data_signature_flip() {
        let mut fixture = Fixture::new(LSF_FALCON_ID_FECS);
        fixture.lsb.signature_mut().prd_keys_mut()[1][0] ^= 1;
        let mut env = fixture.stage();

        assert_eq!(
            run(&mut env, VerificationPolicy::production(SALT)).unwrap_err(),
            AcrError::ACR_LS_SIGNATURE_MISMATCH
        );
        assert_eq!(
            persisted_header(&env).status(),
            LsImageStatus::ValidationDataFailed as u32
        );
    }

    #[test]
    fn test_content_flip() {
        let fixture = Fixture::new(LSF_FALCON_ID_PMU);
        let mut env = fixture.stage();
        env.load(UCODE_OFFSET as usize + 0x21, &[0xFF]);

        assert_eq!(
            run(&mut env, VerificationPolicy::production(SALT)).unwrap_err(),
            AcrError::ACR_LS_SIGNATURE_MISMATCH
        );
    }

    #[test]
    fn test_debug_mode_selects_debug_keys() {
        let mut fixture = Fixture::new(LSF_FALCON_ID_SEC2);
        fixture.lsb.signature_mut().prd_keys_mut()[0] = [0; 16];
        let mut env = fixture.stage();
        env.debug = true;
        assert!(run(&mut env, VerificationPolicy::production(SALT)).is_ok());

        let mut env = fixture.stage();
        assert_eq!(
            run(&mut env, VerificationPolicy::production(SALT)).unwrap_err(),
            AcrError::ACR_LS_SIGNATURE_MISMATCH
        );
    }

    #[test]
    fn test_unsigned_legacy_image() {
        let mut fixture = Fixture::new(LSF_FALCON_ID_PMU);
        fixture.lsb.signature_mut().set_prd_present(0);

        let mut env = fixture.stage();
        assert_eq!(
            run(&mut env, VerificationPolicy::production(SALT)).unwrap_err(),
            AcrError::ACR_LS_SIGNATURE_NOT_PRESENT
        );

        let legacy = [LSF_FALCON_ID_PMU];
        let policy = VerificationPolicy {
            production: false,
            unsigned_allow_list: &legacy,
            ..VerificationPolicy::production(SALT)
        };
        let mut env = fixture.stage();
        let info = run(&mut env, policy).unwrap();
        assert_eq!(info.images[0].status, LsImageStatus::ValidationSkipped);
        assert_eq!(
            persisted_header(&env).status(),
            LsImageStatus::ValidationSkipped as u32
        );

        // Production parts ignore the allow-list.
        let mut env = fixture.stage();
        let policy = VerificationPolicy {
            production: true,
            ..policy
        };
        assert_eq!(
            run(&mut env, policy).unwrap_err(),
            AcrError::ACR_LS_SIGNATURE_NOT_PRESENT
        );
    }

    #[test]
    fn test_verification_disabled() {
        let mut fixture = Fixture::new(LSF_FALCON_ID_PMU);
        fixture.lsb.signature_mut().prd_keys_mut()[0] = [0; 16];
        let policy = VerificationPolicy {
            production: false,
            verify_signatures: false,
            ..VerificationPolicy::production(SALT)
        };
        let mut env = fixture.stage();
        let info = run(&mut env, policy).unwrap();
        assert_eq!(info.images[0].status, LsImageStatus::ValidationSkipped);
        assert!(zeroed(&env, UCODE_OFFSET + CODE_SIZE + DATA_SIZE..LS_UCODE_END));
    }

    #[test]
    fn test_versioned_image() {
        let mut fixture = Fixture::new(LSF_FALCON_ID_SEC2);
        fixture.lsb.signature_mut().set_supports_versioning(1);
        fixture.sign();
        let mut env = fixture.stage();
        assert!(run(&mut env, VerificationPolicy::production(SALT)).is_ok());

        // Signature covers the version, header disagrees with it.
        fixture.header.set_bin_version(2);
        let mut env = fixture.stage();
        assert_eq!(
            run(&mut env, VerificationPolicy::production(SALT)).unwrap_err(),
            AcrError::ACR_REVOCATION_VERSION_MISMATCH
        );
        assert_eq!(
            persisted_header(&env).status(),
            LsImageStatus::RevocationCheckFailed as u32
        );
    }

    #[test]
    fn test_versioned_image_without_bin_version() {
        let mut fixture = Fixture::new(LSF_FALCON_ID_SEC2);
        fixture.header.set_bin_version(LSF_FALCON_BIN_VERSION_INVALID);
        fixture
            .lsb
            .signature_mut()
            .set_supports_versioning(1)
            .set_version(LSF_FALCON_BIN_VERSION_INVALID);
        fixture.sign();
        let mut env = fixture.stage();

        let info = run(&mut env, VerificationPolicy::production(SALT)).unwrap();
        assert_eq!(info.images[0].status, LsImageStatus::ValidationDone);
    }

    #[test]
    fn test_falcon_id_mismatch() {
        let mut fixture = Fixture::new(LSF_FALCON_ID_SEC2);
        fixture.lsb.signature_mut().set_falcon_id(LSF_FALCON_ID_PMU);
        let mut env = fixture.stage();
        let err = run(&mut env, VerificationPolicy::production(SALT)).unwrap_err();
        assert_eq!(err, AcrError::ACR_LSB_FALCON_ID_MISMATCH);
        assert_eq!(err.kind(), AcrErrorKind::Sanity);
    }

    #[test]
    fn test_bl_data_halt_marker() {
        let mut fixture = Fixture::new(LSF_FALCON_ID_SEC2);
        fixture.bl_data = vec![0x11; 32];
        fixture
            .lsb
            .set_bl_data_offset(BL_DATA_OFFSET)
            .set_bl_data_size(32);
        fixture.sign();
        let mut env = fixture.stage();

        let info = run(&mut env, VerificationPolicy::production(SALT)).unwrap();
        assert_eq!(info.images[0].cursor, BL_DATA_OFFSET + 32);

        let blob = &env.mem()[BL_DATA_OFFSET as usize..BL_DATA_OFFSET as usize + 32];
        assert_eq!(&blob[..4], &BL_DATA_HALT_MARKER.to_le_bytes());
        assert!(blob[4..].iter().all(|b| *b == 0x11));
        assert!(zeroed(&env, UCODE_OFFSET + CODE_SIZE + DATA_SIZE..BL_DATA_OFFSET));
        assert!(zeroed(&env, BL_DATA_OFFSET + 32..LS_UCODE_END));
    }

    #[test]
    fn test_bl_data_policy() {
        let mut fixture = Fixture::new(LSF_FALCON_ID_FECS);
        fixture.bl_data = vec![0x11; 32];
        fixture
            .lsb
            .set_bl_data_offset(BL_DATA_OFFSET)
            .set_bl_data_size(32);
        let mut env = fixture.stage();
        assert_eq!(
            run(&mut env, VerificationPolicy::production(SALT)).unwrap_err(),
            AcrError::ACR_BL_DATA_NOT_PERMITTED
        );

        let allow = [BlDataAllowance {
            falcon_id: LSF_FALCON_ID_FECS,
            max_size: 16,
        }];
        let policy = VerificationPolicy {
            bl_data_allow_list: &allow,
            ..VerificationPolicy::production(SALT)
        };
        let mut env = fixture.stage();
        assert_eq!(
            run(&mut env, policy).unwrap_err(),
            AcrError::ACR_BL_DATA_SIZE_INVALID
        );
    }

    #[test]
    fn test_no_images() {
        let mut env = TestEnv::new(LS_UCODE_END as usize);
        env.load(0, WprHeader::sentinel().as_bytes());
        assert_eq!(
            run(&mut env, VerificationPolicy::production(SALT)).unwrap_err(),
            AcrError::ACR_WPR_HEADER_NONE_FOUND
        );
        assert!(env.writes.is_empty());
    }

    #[test]
    fn test_duplicate_falcon() {
        let fixture = Fixture::new(LSF_FALCON_ID_SEC2);
        let mut env = fixture.stage();
        env.load(WPR_HEADER_BYTE_SIZE, fixture.header.as_bytes());
        env.load(2 * WPR_HEADER_BYTE_SIZE, WprHeader::sentinel().as_bytes());
        assert_eq!(
            run(&mut env, VerificationPolicy::production(SALT)).unwrap_err(),
            AcrError::ACR_WPR_HEADER_DUPLICATE_FALCON_ID
        );
        assert!(env.writes.is_empty());
    }

    #[test]
    fn test_gap_scrub_skip_is_debug_only() {
        let fixture = Fixture::new(LSF_FALCON_ID_SEC2);
        let tail = UCODE_OFFSET + CODE_SIZE + DATA_SIZE..LS_UCODE_END;

        let policy = VerificationPolicy {
            production: false,
            skip_gap_scrub: true,
            ..VerificationPolicy::production(SALT)
        };
        let mut env = fixture.stage();
        run(&mut env, policy).unwrap();
        assert!(env.mem()[tail.start as usize..tail.end as usize]
            .iter()
            .all(|b| *b == FILL));

        let policy = VerificationPolicy {
            production: true,
            ..policy
        };
        let mut env = fixture.stage();
        run(&mut env, policy).unwrap();
        assert!(zeroed(&env, tail));
    }

    #[test]
    fn test_protection_hook_failure() {
        let fixture = Fixture::new(LSF_FALCON_ID_SEC2);
        let mut env = fixture.stage();
        env.reject_protections = true;
        assert_eq!(
            run(&mut env, VerificationPolicy::production(SALT)).unwrap_err(),
            AcrError::ACR_PROTECTION_SETUP_FAILURE
        );
        assert!(zeroed(&env, UCODE_OFFSET..UCODE_OFFSET + CODE_SIZE));
    }

    #[test]
    fn test_lsb_failure_persists_table() {
        let mut fixture = Fixture::new(LSF_FALCON_ID_SEC2);
        fixture.lsb.set_ucode_size(CODE_SIZE + 8);
        let mut env = fixture.stage();
        assert_eq!(
            run(&mut env, VerificationPolicy::production(SALT)).unwrap_err(),
            AcrError::ACR_LSB_UCODE_UNALIGNED
        );
        let header = persisted_header(&env);
        assert_eq!(header.falcon_id(), LSF_FALCON_ID_SEC2);
        assert_eq!(header.status(), LsImageStatus::ValidationCodeFailed as u32);
        // Code was never claimed, so it was not scrubbed by the failure path.
        assert_eq!(
            &env.mem()[UCODE_OFFSET as usize..(UCODE_OFFSET + CODE_SIZE) as usize],
            fixture.code.as_slice()
        );
    }

    #[test]
    fn test_sig_group_signatures_published() {
        let mut fixture = Fixture::new(LSF_FALCON_ID_SEC2);
        let mut trailer = SigGroupTrailer::default();
        trailer.header_mut().set_magic(SIG_GROUP_MAGIC).set_count(2);
        trailer.entries_mut()[0] = SigGroupEntry::new(0, 0x40, 2);
        trailer.entries_mut()[1] = SigGroupEntry::new(0x40, 0x80, SIG_GROUP_ID_ALL);
        fixture.code = trailer.as_bytes().to_vec();
        fixture.sign();
        let mut env = fixture.stage();

        run(&mut env, VerificationPolicy::production(SALT)).unwrap();

        let ids: Vec<u32> = env.sig_group_writes.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);

        let mut scratch = TestEnv::new(0);
        let key = derive_key(&mut scratch, &SALT, LSF_FALCON_ID_SEC2).unwrap();
        let mut group2 = AesBlock::ZERO;
        fold_blocks(&mut scratch, &mut group2, &fixture.code[..0x80]).unwrap();
        let expected = compute_signature(&mut scratch, &key, &group2).unwrap();
        assert_eq!(env.sig_group_writes[1], (2, expected));
    }
}
